//! StationPipeline – Verarbeiten, Puffern, getaktet Ausgeben
//!
//! ## State Machine
//! ```text
//! Idle --start()--> Running --stop()--> Stopped
//!                      ^                   |
//!                      +----- start() -----+
//! ```
//!
//! `process_audio` und der Egress-Timer laufen auf verschiedenen Tasks.
//! Der gesamte veraenderliche Zustand (Puffer, Zaehler, Jitter, Config)
//! liegt deshalb hinter einem einzigen Mutex pro Station.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use voxbridge_core::{jetzt_ms, StationId};

use crate::buffer::OutputBuffer;
use crate::config::{StationConfig, StationConfigUpdate};
use crate::error::StationResult;
use crate::events::{StationEvent, Stufe};
use crate::jitter::JitterTracker;
use crate::metrics::{StationMetriken, StationZaehler};
use crate::processor::{AudioProcessor, GainProcessor};
use crate::sink::FrameSink;

const EVENT_KAPAZITAET: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lebenszyklus {
    Idle,
    Running,
    Stopped,
}

struct StationZustand {
    config: StationConfig,
    lebenszyklus: Lebenszyklus,
    puffer: OutputBuffer,
    zaehler: StationZaehler,
    jitter: JitterTracker,
    gestartet: Option<Instant>,
}

struct StationInner {
    id: StationId,
    zustand: Mutex<StationZustand>,
    prozessor: Box<dyn AudioProcessor>,
    senke: Box<dyn FrameSink>,
    events: broadcast::Sender<StationEvent>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StationInner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Eine Station pro aktivem Endpunkt
#[derive(Clone)]
pub struct StationPipeline {
    inner: Arc<StationInner>,
}

impl StationPipeline {
    /// Station mit Standard-Verarbeitung (Eingangsverstaerkung)
    pub fn neu(
        id: StationId,
        config: StationConfig,
        senke: impl FrameSink,
    ) -> StationResult<Self> {
        Self::mit_prozessor(id, config, GainProcessor, senke)
    }

    pub fn mit_prozessor(
        id: StationId,
        config: StationConfig,
        prozessor: impl AudioProcessor,
        senke: impl FrameSink,
    ) -> StationResult<Self> {
        config.pruefen()?;
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        tracing::debug!(
            station_id = %id,
            prozessor = prozessor.name(),
            max_buffer = config.max_buffer_bytes,
            frame_size = config.frame_size_bytes,
            frame_delay_ms = config.frame_delay_ms,
            "Station erstellt"
        );
        Ok(Self {
            inner: Arc::new(StationInner {
                id,
                zustand: Mutex::new(StationZustand {
                    puffer: OutputBuffer::neu(config.max_buffer_bytes),
                    config,
                    lebenszyklus: Lebenszyklus::Idle,
                    zaehler: StationZaehler::default(),
                    jitter: JitterTracker::neu(),
                    gestartet: None,
                }),
                prozessor: Box::new(prozessor),
                senke: Box::new(senke),
                events,
                timer: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> &StationId {
        &self.inner.id
    }

    pub fn abonnieren(&self) -> broadcast::Receiver<StationEvent> {
        self.inner.events.subscribe()
    }

    pub fn lebenszyklus(&self) -> Lebenszyklus {
        self.inner.zustand.lock().lebenszyklus
    }

    pub fn is_running(&self) -> bool {
        self.lebenszyklus() == Lebenszyklus::Running
    }

    pub fn config(&self) -> StationConfig {
        self.inner.zustand.lock().config.clone()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Startet die Station und den Egress-Timer
    ///
    /// Ohne Wirkung, wenn die Station bereits laeuft oder deaktiviert ist.
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn start(&self) {
        {
            let mut z = self.inner.zustand.lock();
            if z.lebenszyklus == Lebenszyklus::Running {
                tracing::warn!(station_id = %self.inner.id, "Station laeuft bereits");
                return;
            }
            if !z.config.enabled {
                tracing::info!(station_id = %self.inner.id, "Station deaktiviert, Start uebersprungen");
                return;
            }
            z.lebenszyklus = Lebenszyklus::Running;
            z.gestartet = Some(Instant::now());
        }

        self.timer_starten();
        tracing::info!(station_id = %self.inner.id, "Station gestartet");
        self.inner.senden(StationEvent::Started {
            station_id: self.inner.id.clone(),
        });
    }

    /// Stoppt die Station; Restdaten im Puffer werden verworfen
    pub fn stop(&self) {
        let rest = {
            let mut z = self.inner.zustand.lock();
            if z.lebenszyklus != Lebenszyklus::Running {
                return;
            }
            z.lebenszyklus = Lebenszyklus::Stopped;
            let rest = z.puffer.leeren();
            z.zaehler.bytes_dropped += rest as u64;
            rest
        };

        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }

        if rest > 0 {
            tracing::warn!(station_id = %self.inner.id, bytes = rest, "Puffer beim Stopp verworfen");
            self.inner.log_event(Stufe::Warnung, "BUFFER_FLUSHED_ON_STOP");
        }
        tracing::info!(station_id = %self.inner.id, "Station gestoppt");
        self.inner.senden(StationEvent::Stopped {
            station_id: self.inner.id.clone(),
        });
    }

    /// (Neu-)Start des Egress-Timers
    ///
    /// Lebenszyklus und Intervall werden unter der Timer-Sperre gelesen:
    /// ein paralleles `stop()` bricht den neuen Task danach ab oder laesst
    /// ihn gar nicht erst entstehen.
    fn timer_starten(&self) {
        let mut timer = self.inner.timer.lock();
        if let Some(alt) = timer.take() {
            alt.abort();
        }
        let (laeuft, delay_ms) = {
            let z = self.inner.zustand.lock();
            (z.lebenszyklus == Lebenszyklus::Running, z.config.frame_delay_ms)
        };
        if !laeuft {
            return;
        }
        if delay_ms == 0 {
            tracing::debug!(station_id = %self.inner.id, "frame_delay_ms = 0, kein Egress-Timer");
            return;
        }
        *timer = Some(tokio::spawn(egress_schleife(
            Arc::downgrade(&self.inner),
            Duration::from_millis(delay_ms),
        )));
    }

    // -----------------------------------------------------------------------
    // Verarbeitung
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Audio-Block und legt das Ergebnis in den Puffer
    ///
    /// Gibt die verarbeiteten Bytes zurueck, oder `None` wenn die Station
    /// nicht laeuft, die Stufe nichts geliefert hat oder fehlgeschlagen ist.
    pub fn process_audio(&self, daten: &[u8]) -> Option<Bytes> {
        self.process_audio_at(daten, Instant::now())
    }

    /// Wie `process_audio`, mit explizitem Ankunftszeitpunkt fuer den Jitter
    pub fn process_audio_at(&self, daten: &[u8], ankunft: Instant) -> Option<Bytes> {
        let beginn = Instant::now();
        let mut z = self.inner.zustand.lock();
        if z.lebenszyklus != Lebenszyklus::Running || !z.config.enabled {
            return None;
        }

        z.zaehler.packets_received += 1;
        z.zaehler.bytes_received += daten.len() as u64;
        z.zaehler.last_packet_ms = Some(jetzt_ms());
        z.jitter.ankunft(ankunft);

        let ergebnis = self.inner.prozessor.verarbeiten(daten, &z.config);
        let verarbeitet = match ergebnis {
            Ok(v) => v,
            Err(e) => {
                z.zaehler.packets_dropped += 1;
                z.zaehler.bytes_dropped += daten.len() as u64;
                drop(z);
                tracing::error!(station_id = %self.inner.id, bytes = daten.len(), fehler = %e, "Verarbeitung fehlgeschlagen");
                self.inner.log_event(Stufe::Fehler, "PROCESSING_FAILED");
                self.inner.alert(Stufe::Fehler, format!("Verarbeitung fehlgeschlagen: {e}"));
                return None;
            }
        };

        if verarbeitet.is_empty() {
            drop(z);
            tracing::debug!(station_id = %self.inner.id, bytes = daten.len(), "Verarbeitung lieferte keine Daten");
            self.inner.log_event(Stufe::Warnung, "PROCESSING_RETURNED_EMPTY");
            return None;
        }

        let ausgabe = Bytes::from(verarbeitet);
        z.zaehler.packets_processed += 1;
        z.zaehler.bytes_processed += ausgabe.len() as u64;

        let policy = z.config.overflow_policy;
        let ergebnis = z.puffer.anhaengen(&ausgabe, policy);
        z.zaehler.bytes_dropped += ergebnis.verworfen as u64;
        z.zaehler.verarbeitungszeit_gesamt_ms += beginn.elapsed().as_secs_f64() * 1000.0;

        let fuellstand = z.puffer.len();
        let max = z.puffer.max_bytes();
        drop(z);

        if ergebnis.ueberlauf > 0 {
            tracing::warn!(
                station_id = %self.inner.id,
                ueberlauf = ergebnis.ueberlauf,
                verworfen = ergebnis.verworfen,
                policy = ?policy,
                fuellstand,
                max,
                "Pufferueberlauf"
            );
            self.inner.alert(
                Stufe::Warnung,
                format!("Pufferueberlauf: {} Bytes verworfen", ergebnis.ueberlauf),
            );
        }

        Some(ausgabe)
    }

    /// Gibt genau einen Frame (Egress-Schwelle) aus, wenn genug gepuffert ist
    ///
    /// Wird vom Timer aufgerufen. Teil-Frames werden nie gesendet.
    pub fn send_buffered_frames(&self) -> bool {
        self.inner.egress()
    }

    // -----------------------------------------------------------------------
    // Konfiguration & Metriken
    // -----------------------------------------------------------------------

    /// Uebernimmt ein partielles Update
    ///
    /// Puffergroesse und Verstaerkung wirken sofort; ein geaendertes
    /// Egress-Intervall startet den Timer einer laufenden Station neu.
    pub fn update_config(&self, update: StationConfigUpdate) -> StationResult<Vec<&'static str>> {
        let (felder, neu_takten) = {
            let mut z = self.inner.zustand.lock();
            let mut neu = z.config.clone();
            let felder = neu.anwenden(&update);
            neu.pruefen()?;

            z.puffer.max_setzen(neu.max_buffer_bytes);
            let takt_geaendert = neu.frame_delay_ms != z.config.frame_delay_ms;
            z.config = neu;
            (felder, takt_geaendert && z.lebenszyklus == Lebenszyklus::Running)
        };

        if neu_takten {
            self.timer_starten();
        }

        tracing::info!(station_id = %self.inner.id, felder = ?felder, "Konfiguration aktualisiert");
        self.inner.senden(StationEvent::ConfigUpdated {
            station_id: self.inner.id.clone(),
            felder: felder.clone(),
        });
        Ok(felder)
    }

    pub fn metriken(&self) -> StationMetriken {
        let z = self.inner.zustand.lock();
        StationMetriken {
            station_id: self.inner.id.clone(),
            enabled: z.config.enabled,
            running: z.lebenszyklus == Lebenszyklus::Running,
            uptime_ms: z
                .gestartet
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
            packets_received: z.zaehler.packets_received,
            packets_processed: z.zaehler.packets_processed,
            packets_sent: z.zaehler.packets_sent,
            packets_dropped: z.zaehler.packets_dropped,
            bytes_received: z.zaehler.bytes_received,
            bytes_processed: z.zaehler.bytes_processed,
            bytes_sent: z.zaehler.bytes_sent,
            bytes_dropped: z.zaehler.bytes_dropped,
            buffer_fill_bytes: z.puffer.len(),
            buffer_fill_percent: z.puffer.fuellstand_prozent(),
            avg_latency_ms: z.zaehler.avg_latency_ms(),
            jitter_ms: z.jitter.jitter_ms(),
            last_packet_ms: z.zaehler.last_packet_ms,
            prozessor: self.inner.prozessor.name(),
            config: z.config.clone(),
        }
    }

    /// Setzt Zaehler und Jitter-Historie zurueck (Puffer bleibt)
    pub fn metriken_zuruecksetzen(&self) {
        {
            let mut z = self.inner.zustand.lock();
            z.zaehler = StationZaehler::default();
            z.jitter.zuruecksetzen();
        }
        self.inner.log_event(Stufe::Info, "METRICS_RESET");
    }
}

impl StationInner {
    fn egress(&self) -> bool {
        let frame = {
            let mut z = self.zustand.lock();
            let schwelle = z.config.egress_schwelle();
            match z.puffer.entnehmen(schwelle) {
                Some(frame) => frame,
                None => return false,
            }
        };
        let bytes = frame.len();

        // Senke ausserhalb des Locks aufrufen
        match self.senke.senden(&self.id, frame) {
            Ok(()) => {
                {
                    let mut z = self.zustand.lock();
                    z.zaehler.packets_sent += 1;
                    z.zaehler.bytes_sent += bytes as u64;
                }
                tracing::trace!(station_id = %self.id, bytes, "Frame ausgegeben");
                self.senden(StationEvent::AudioSent {
                    station_id: self.id.clone(),
                    bytes,
                });
                true
            }
            Err(e) => {
                {
                    let mut z = self.zustand.lock();
                    z.zaehler.packets_dropped += 1;
                    z.zaehler.bytes_dropped += bytes as u64;
                }
                tracing::warn!(station_id = %self.id, bytes, fehler = %e, "Egress-Frame verworfen");
                self.alert(Stufe::Warnung, format!("Egress fehlgeschlagen: {e}"));
                false
            }
        }
    }

    fn senden(&self, event: StationEvent) {
        let _ = self.events.send(event);
    }

    fn alert(&self, stufe: Stufe, nachricht: String) {
        self.senden(StationEvent::Alert {
            station_id: self.id.clone(),
            stufe,
            nachricht,
        });
    }

    fn log_event(&self, stufe: Stufe, art: &'static str) {
        self.senden(StationEvent::Event {
            station_id: self.id.clone(),
            stufe,
            art,
        });
    }
}

/// Egress-Timer; endet, sobald die Station freigegeben wurde
async fn egress_schleife(station: Weak<StationInner>, periode: Duration) {
    let mut intervall = tokio::time::interval_at(tokio::time::Instant::now() + periode, periode);
    intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        intervall.tick().await;
        let Some(inner) = station.upgrade() else {
            break;
        };
        inner.egress();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::error::StationError;
    use crate::sink::{ChannelSink, EgressFrame};
    use tokio::sync::mpsc;

    fn station(config: StationConfig) -> (StationPipeline, mpsc::Receiver<EgressFrame>) {
        let (senke, rx) = ChannelSink::kanal(64);
        let station = StationPipeline::neu(StationId::from("test"), config, senke).unwrap();
        (station, rx)
    }

    fn ohne_timer() -> StationConfig {
        StationConfig {
            frame_delay_ms: 0,
            ..StationConfig::default()
        }
    }

    /// Laesst den Egress-Task nach einem Zeitsprung laufen
    async fn ticks(dauer_ms: u64) {
        tokio::time::sleep(Duration::from_millis(dauer_ms + 1)).await;
        tokio::task::yield_now().await;
    }

    struct Fehlschlag;

    impl AudioProcessor for Fehlschlag {
        fn verarbeiten(&self, pcm: &[u8], _: &StationConfig) -> StationResult<Vec<u8>> {
            if pcm.first() == Some(&0xFF) {
                Err(StationError::verarbeitung("kaputter Block"))
            } else {
                Ok(pcm.to_vec())
            }
        }
    }

    struct Leer;

    impl AudioProcessor for Leer {
        fn verarbeiten(&self, _: &[u8], _: &StationConfig) -> StationResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn nicht_gestartet_verarbeitet_nichts() {
        let (station, _rx) = station(ohne_timer());
        assert!(station.process_audio(&[0; 320]).is_none());
        assert_eq!(station.metriken().packets_received, 0);
    }

    #[tokio::test]
    async fn deaktivierte_station_startet_nicht() {
        let (station, _rx) = station(StationConfig {
            enabled: false,
            ..ohne_timer()
        });
        station.start();
        assert_eq!(station.lebenszyklus(), Lebenszyklus::Idle);
    }

    #[tokio::test]
    async fn start_stop_sind_idempotent() {
        let (station, _rx) = station(ohne_timer());
        let mut events = station.abonnieren();

        station.start();
        station.start();
        station.process_audio(&[0; 100]);
        station.stop();
        station.stop();

        assert_eq!(station.lebenszyklus(), Lebenszyklus::Stopped);
        let m = station.metriken();
        assert_eq!(m.bytes_dropped, 100);
        assert_eq!(m.buffer_fill_bytes, 0);

        let mut arten = Vec::new();
        while let Ok(e) = events.try_recv() {
            arten.push(e);
        }
        let gestartet = arten
            .iter()
            .filter(|e| matches!(e, StationEvent::Started { .. }))
            .count();
        let gestoppt = arten
            .iter()
            .filter(|e| matches!(e, StationEvent::Stopped { .. }))
            .count();
        assert_eq!((gestartet, gestoppt), (1, 1));
        assert!(arten.iter().any(|e| matches!(
            e,
            StationEvent::Event { art: "BUFFER_FLUSHED_ON_STOP", .. }
        )));
    }

    #[tokio::test]
    async fn ueberlauf_drop_oldest() {
        let (station, _rx) = station(StationConfig {
            max_buffer_bytes: 1000,
            ..ohne_timer()
        });
        let mut events = station.abonnieren();
        station.start();
        station.process_audio(&[1; 900]);
        station.process_audio(&[2; 200]);

        let m = station.metriken();
        assert_eq!(m.buffer_fill_bytes, 1000);
        assert_eq!(m.bytes_dropped, 100);
        assert!(std::iter::from_fn(|| events.try_recv().ok()).any(|e| matches!(
            e,
            StationEvent::Alert { stufe: Stufe::Warnung, .. }
        )));
    }

    #[tokio::test]
    async fn ueberlauf_drop_newest() {
        let (station, _rx) = station(StationConfig {
            max_buffer_bytes: 1000,
            overflow_policy: OverflowPolicy::DropNewest,
            ..ohne_timer()
        });
        station.start();
        station.process_audio(&[1; 900]);
        station.process_audio(&[2; 200]);

        let m = station.metriken();
        assert_eq!(m.buffer_fill_bytes, 900);
        assert_eq!(m.bytes_dropped, 200);
    }

    #[tokio::test]
    async fn verarbeitungsfehler_betrifft_nur_einen_block() {
        let (senke, _rx) = ChannelSink::kanal(4);
        let station = StationPipeline::mit_prozessor(
            StationId::from("fehler"),
            ohne_timer(),
            Fehlschlag,
            senke,
        )
        .unwrap();
        let mut events = station.abonnieren();
        station.start();

        assert!(station.process_audio(&[0xFF, 0]).is_none());
        assert!(station.process_audio(&[1, 2]).is_some());
        assert!(station.is_running());

        let m = station.metriken();
        assert_eq!(m.packets_dropped, 1);
        assert_eq!(m.bytes_dropped, 2);
        assert_eq!(m.packets_processed, 1);
        assert!(std::iter::from_fn(|| events.try_recv().ok()).any(|e| matches!(
            e,
            StationEvent::Alert { stufe: Stufe::Fehler, .. }
        )));
    }

    #[tokio::test]
    async fn leere_ausgabe_wird_nicht_gepuffert() {
        let (senke, _rx) = ChannelSink::kanal(4);
        let station =
            StationPipeline::mit_prozessor(StationId::from("leer"), ohne_timer(), Leer, senke)
                .unwrap();
        station.start();
        assert!(station.process_audio(&[0; 320]).is_none());
        let m = station.metriken();
        assert_eq!(m.packets_received, 1);
        assert_eq!(m.packets_processed, 0);
        assert_eq!(m.packets_dropped, 0);
        assert_eq!(m.buffer_fill_bytes, 0);
    }

    #[tokio::test]
    async fn gain_wird_vor_dem_puffern_angewendet() {
        let (station, _rx) = station(StationConfig {
            input_gain: 2.0,
            ..ohne_timer()
        });
        station.start();
        let ausgabe = station.process_audio(&100i16.to_le_bytes()).unwrap();
        assert_eq!(&ausgabe[..], &200i16.to_le_bytes());
    }

    #[tokio::test]
    async fn jitter_konstanter_takt() {
        let (station, _rx) = station(ohne_timer());
        station.start();
        let mut t = Instant::now();
        for _ in 0..10 {
            station.process_audio_at(&[0; 320], t);
            t += Duration::from_millis(20);
        }
        assert!(station.metriken().jitter_ms < 1e-6);
    }

    #[tokio::test]
    async fn jitter_wechselnder_takt() {
        let (station, _rx) = station(ohne_timer());
        station.start();
        let mut t = Instant::now();
        for i in 0..10 {
            station.process_audio_at(&[0; 320], t);
            t += Duration::from_millis(if i % 2 == 0 { 10 } else { 30 });
        }
        // 9 Abstaende: 10, 30, 10, ... , 10
        let abstaende: Vec<f64> = (0..9).map(|i| if i % 2 == 0 { 10.0 } else { 30.0 }).collect();
        let mittel = abstaende.iter().sum::<f64>() / 9.0;
        let erwartet =
            (abstaende.iter().map(|a| (a - mittel).powi(2)).sum::<f64>() / 9.0).sqrt();

        let jitter = station.metriken().jitter_ms;
        assert!(jitter > 0.0);
        assert!((jitter - erwartet).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn egress_sendet_nie_teilframes() {
        let (station, mut rx) = station(StationConfig::default());
        station.start();

        station.process_audio(&[7; 319]);
        ticks(200).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(station.metriken().buffer_fill_bytes, 319);

        station.process_audio(&[7; 1]);
        ticks(20).await;
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.pcm.len(), 320);
        assert_eq!(frame.station_id.as_str(), "test");
        assert_eq!(station.metriken().buffer_fill_bytes, 0);
        assert_eq!(station.metriken().packets_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn egress_ein_frame_pro_tick() {
        let (station, mut rx) = station(StationConfig::default());
        station.start();
        station.process_audio(&[0; 960]);

        ticks(20).await;
        assert_eq!(station.metriken().buffer_fill_bytes, 640);
        ticks(40).await;
        assert_eq!(station.metriken().buffer_fill_bytes, 0);

        let mut anzahl = 0;
        while rx.try_recv().is_ok() {
            anzahl += 1;
        }
        assert_eq!(anzahl, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn neues_intervall_startet_timer_neu() {
        let (station, mut rx) = station(StationConfig::default());
        station.start();

        let felder = station
            .update_config(StationConfigUpdate {
                frame_delay_ms: Some(100),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(felder, vec!["frame_delay_ms"]);

        station.process_audio(&[0; 320]);
        ticks(50).await;
        assert!(rx.try_recv().is_err());
        ticks(60).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_beendet_timer() {
        let (station, mut rx) = station(StationConfig::default());
        station.start();
        station.stop();
        station.process_audio(&[0; 320]);
        ticks(100).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn gestoppte_station_bekommt_keinen_timer() {
        let (station, mut rx) = station(StationConfig::default());
        station.start();
        station.stop();
        // Nachzuegler eines update_config, das vor dem Stopp entschieden hat
        station.timer_starten();
        assert!(station.inner.timer.lock().is_none());

        station.process_audio(&[0; 320]);
        ticks(100).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_wirkt_sofort_und_wird_geprueft() {
        let (station, _rx) = station(ohne_timer());
        station.start();
        station
            .update_config(StationConfigUpdate {
                max_buffer_bytes: Some(400),
                input_gain: Some(0.5),
                ..Default::default()
            })
            .unwrap();
        let ausgabe = station.process_audio(&[100, 0, 100, 0]).unwrap();
        assert_eq!(&ausgabe[..], &[50, 0, 50, 0]);
        station.process_audio(&[0; 400]);
        assert_eq!(station.metriken().buffer_fill_bytes, 400);

        let fehler = station.update_config(StationConfigUpdate {
            frame_size_bytes: Some(0),
            ..Default::default()
        });
        assert!(fehler.is_err());
        assert_eq!(station.config().frame_size_bytes, 320);
    }

    #[tokio::test]
    async fn schwelle_ueberschreibt_frame_groesse() {
        let (station, mut rx) = station(StationConfig {
            buffer_accumulation_threshold_bytes: Some(640),
            ..ohne_timer()
        });
        station.start();
        station.process_audio(&[0; 320]);
        assert!(!station.send_buffered_frames());
        station.process_audio(&[0; 320]);
        assert!(station.send_buffered_frames());
        assert_eq!(rx.try_recv().unwrap().pcm.len(), 640);
    }

    #[tokio::test]
    async fn volle_senke_zaehlt_verworfene_frames() {
        let (senke, _rx) = ChannelSink::kanal(1);
        let station =
            StationPipeline::neu(StationId::from("voll"), ohne_timer(), senke).unwrap();
        station.start();
        station.process_audio(&[0; 640]);
        assert!(station.send_buffered_frames());
        assert!(!station.send_buffered_frames());
        let m = station.metriken();
        assert_eq!(m.packets_sent, 1);
        assert_eq!(m.packets_dropped, 1);
        assert_eq!(m.bytes_dropped, 320);
    }

    #[tokio::test]
    async fn metriken_zuruecksetzen_behaelt_puffer() {
        let (station, _rx) = station(ohne_timer());
        station.start();
        station.process_audio(&[0; 100]);
        station.metriken_zuruecksetzen();
        let m = station.metriken();
        assert_eq!(m.packets_received, 0);
        assert_eq!(m.jitter_ms, 0.0);
        assert_eq!(m.buffer_fill_bytes, 100);
    }
}
