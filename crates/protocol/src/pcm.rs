//! PCM16-Hilfsfunktionen und Audioformat-Beschreibung
//!
//! Alle Audiodaten im System sind signed 16-bit little-endian mono.

use serde::{Deserialize, Serialize};

/// Bytes pro PCM16-Sample
pub const BYTES_PRO_SAMPLE: usize = 2;

/// Format eines PCM16-Audiostroms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Groesse eines Frames in Bytes
    pub frame_size_bytes: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        // 20ms bei 8kHz
        Self {
            sample_rate: 8000,
            frame_size_bytes: 320,
        }
    }
}

impl AudioFormat {
    pub fn new(sample_rate: u32, frame_size_bytes: usize) -> Self {
        Self {
            sample_rate,
            frame_size_bytes,
        }
    }

    /// Samples pro Frame
    pub fn samples_pro_frame(&self) -> usize {
        self.frame_size_bytes / BYTES_PRO_SAMPLE
    }

    /// Dauer eines Frames in Millisekunden (ganzzahlig abgerundet)
    pub fn frame_dauer_ms(&self) -> u64 {
        dauer_ms(self.frame_size_bytes, self.sample_rate)
    }
}

/// Abspieldauer von `bytes` PCM16-Daten bei `sample_rate`
pub fn dauer_ms(bytes: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (bytes / BYTES_PRO_SAMPLE) as u64 * 1000 / sample_rate as u64
}

/// Wendet einen linearen Verstaerkungsfaktor auf PCM16-Daten an
///
/// Jedes Sample wird mit `gain` multipliziert, abgerundet und auf den
/// i16-Bereich begrenzt. Ein ueberzaehliges letztes Byte bleibt unveraendert.
pub fn verstaerkung_anwenden(pcm: &[u8], gain: f32) -> Vec<u8> {
    let mut ausgabe = Vec::with_capacity(pcm.len());
    let mut samples = pcm.chunks_exact(BYTES_PRO_SAMPLE);
    for s in &mut samples {
        let sample = i16::from_le_bytes([s[0], s[1]]) as f32;
        let skaliert = (sample * gain)
            .floor()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        ausgabe.extend_from_slice(&skaliert.to_le_bytes());
    }
    ausgabe.extend_from_slice(samples.remainder());
    ausgabe
}
