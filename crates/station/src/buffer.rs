//! Ausgangspuffer mit Ueberlauf-Policy
//!
//! FIFO ueber rohe Bytes. Der Puffer wird nur von der besitzenden
//! StationPipeline veraendert (unter deren Mutex).

use bytes::{Buf, Bytes, BytesMut};

use crate::config::OverflowPolicy;

/// Ergebnis eines `anhaengen`-Aufrufs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anhaengen {
    /// Um wie viele Bytes das Maximum ueberschritten worden waere (0 = kein Ueberlauf)
    pub ueberlauf: usize,
    /// Tatsaechlich verworfene Bytes (alt oder neu, je nach Policy)
    pub verworfen: usize,
}

#[derive(Debug)]
pub struct OutputBuffer {
    daten: BytesMut,
    max_bytes: usize,
}

impl OutputBuffer {
    pub fn neu(max_bytes: usize) -> Self {
        Self {
            daten: BytesMut::new(),
            max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.daten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daten.is_empty()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_setzen(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    /// Fuellstand in Prozent des Maximums
    pub fn fuellstand_prozent(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.daten.len() as f64 / self.max_bytes as f64 * 100.0
    }

    /// Haengt `neu` unter Beachtung von Maximum und Policy an
    pub fn anhaengen(&mut self, neu: &[u8], policy: OverflowPolicy) -> Anhaengen {
        let gesamt = self.daten.len() + neu.len();
        if gesamt <= self.max_bytes {
            self.daten.extend_from_slice(neu);
            return Anhaengen::default();
        }

        let ueberlauf = gesamt - self.max_bytes;
        let verworfen = match policy {
            OverflowPolicy::DropOldest => {
                if neu.len() >= self.max_bytes {
                    // Nur die juengsten `max` Bytes der neuen Daten bleiben
                    let alt = self.daten.len();
                    self.daten.clear();
                    self.daten
                        .extend_from_slice(&neu[neu.len() - self.max_bytes..]);
                    alt + neu.len() - self.max_bytes
                } else {
                    let behalten = self.max_bytes - neu.len();
                    let weg = self.daten.len() - behalten;
                    self.daten.advance(weg);
                    self.daten.extend_from_slice(neu);
                    weg
                }
            }
            OverflowPolicy::DropNewest => neu.len(),
        };

        Anhaengen {
            ueberlauf,
            verworfen,
        }
    }

    /// Entnimmt genau `anzahl` Bytes von vorne, wenn so viele vorhanden sind
    pub fn entnehmen(&mut self, anzahl: usize) -> Option<Bytes> {
        if anzahl == 0 || self.daten.len() < anzahl {
            return None;
        }
        Some(self.daten.split_to(anzahl).freeze())
    }

    /// Leert den Puffer und liefert die Anzahl verworfener Bytes
    pub fn leeren(&mut self) -> usize {
        let anzahl = self.daten.len();
        self.daten.clear();
        anzahl
    }

    pub fn inhalt(&self) -> &[u8] {
        &self.daten
    }
}
