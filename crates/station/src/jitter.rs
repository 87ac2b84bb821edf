//! Jitter-Schaetzung ueber Ankunftsabstaende
//!
//! Jitter = Populations-Standardabweichung der letzten 100
//! Ankunftsabstaende (in Millisekunden). Mit weniger als zwei Abstaenden
//! ist der Jitter 0.

use std::collections::VecDeque;
use std::time::Instant;

/// Anzahl gespeicherter Ankunftsabstaende
pub const JITTER_FENSTER: usize = 100;

#[derive(Debug, Default)]
pub struct JitterTracker {
    abstaende_ms: VecDeque<f64>,
    letzte_ankunft: Option<Instant>,
    jitter_ms: f64,
}

impl JitterTracker {
    pub fn neu() -> Self {
        Self {
            abstaende_ms: VecDeque::with_capacity(JITTER_FENSTER),
            ..Self::default()
        }
    }

    /// Registriert eine Ankunft und aktualisiert die Schaetzung
    pub fn ankunft(&mut self, zeitpunkt: Instant) {
        if let Some(letzte) = self.letzte_ankunft {
            let delta = zeitpunkt.saturating_duration_since(letzte).as_secs_f64() * 1000.0;
            if self.abstaende_ms.len() == JITTER_FENSTER {
                self.abstaende_ms.pop_front();
            }
            self.abstaende_ms.push_back(delta);
            self.jitter_ms = standardabweichung(&self.abstaende_ms);
        }
        self.letzte_ankunft = Some(zeitpunkt);
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    pub fn abstaende(&self) -> usize {
        self.abstaende_ms.len()
    }

    pub fn zuruecksetzen(&mut self) {
        self.abstaende_ms.clear();
        self.letzte_ankunft = None;
        self.jitter_ms = 0.0;
    }
}

fn standardabweichung(werte: &VecDeque<f64>) -> f64 {
    if werte.len() < 2 {
        return 0.0;
    }
    let n = werte.len() as f64;
    let mittel = werte.iter().sum::<f64>() / n;
    let varianz = werte.iter().map(|w| (w - mittel).powi(2)).sum::<f64>() / n;
    varianz.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mit_abstaenden(abstaende: &[u64]) -> JitterTracker {
        let mut tracker = JitterTracker::neu();
        let mut t = Instant::now();
        tracker.ankunft(t);
        for &ms in abstaende {
            t += Duration::from_millis(ms);
            tracker.ankunft(t);
        }
        tracker
    }

    #[test]
    fn konstanter_takt_hat_keinen_jitter() {
        let tracker = mit_abstaenden(&[20; 9]);
        assert_eq!(tracker.abstaende(), 9);
        assert!(tracker.jitter_ms() < 1e-9);
    }

    #[test]
    fn wechselnder_takt() {
        let tracker = mit_abstaenden(&[10, 30, 10, 30, 10, 30]);
        assert!((tracker.jitter_ms() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn weniger_als_zwei_abstaende() {
        assert_eq!(mit_abstaenden(&[]).jitter_ms(), 0.0);
        assert_eq!(mit_abstaenden(&[50]).jitter_ms(), 0.0);
    }

    #[test]
    fn fenster_ist_begrenzt() {
        let mut abstaende = vec![500; 10];
        abstaende.extend(vec![20; JITTER_FENSTER]);
        let tracker = mit_abstaenden(&abstaende);
        assert_eq!(tracker.abstaende(), JITTER_FENSTER);
        // Die Ausreisser sind aus dem Fenster gefallen
        assert!(tracker.jitter_ms() < 1e-9);
    }

    #[test]
    fn zuruecksetzen_vergisst_letzte_ankunft() {
        let mut tracker = mit_abstaenden(&[10, 30]);
        tracker.zuruecksetzen();
        tracker.ankunft(Instant::now());
        assert_eq!(tracker.abstaende(), 0);
        assert_eq!(tracker.jitter_ms(), 0.0);
    }
}
