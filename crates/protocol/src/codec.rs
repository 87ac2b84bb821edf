//! G.711 Companding (μ-law / A-law) fuer 8-Bit-Eingaenge
//!
//! Zustandslose Konvertierung zwischen PCM16 (little-endian) und den
//! 8-Bit-Companding-Formaten. Die Dekodier-Tabellen werden einmalig beim
//! ersten Zugriff berechnet; die Kodierung erfolgt segmentweise.
//!
//! Wird benutzt, wenn ein Message-Transport-Endpunkt `ulaw` oder `alaw`
//! im Request-Pfad angibt.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Encoding (aus dem Request-Pfad)
// ---------------------------------------------------------------------------

/// Audio-Encoding eines Endpunkts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Signed linear 16 Bit little-endian
    #[default]
    Slin16,
    /// G.711 μ-law
    Ulaw,
    /// G.711 A-law
    Alaw,
}

impl Encoding {
    /// Parst den Encoding-Namen aus einem Pfadsegment
    pub fn aus_pfadsegment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "slin" | "slin16" | "pcm16" | "l16" => Some(Self::Slin16),
            "ulaw" | "mulaw" | "pcmu" => Some(Self::Ulaw),
            "alaw" | "pcma" => Some(Self::Alaw),
            _ => None,
        }
    }

    /// Companding-Verfahren, falls das Encoding komprimiert ist
    pub fn companding(&self) -> Option<Companding> {
        match self {
            Self::Slin16 => None,
            Self::Ulaw => Some(Companding::Ulaw),
            Self::Alaw => Some(Companding::Alaw),
        }
    }
}

// ---------------------------------------------------------------------------
// Companding
// ---------------------------------------------------------------------------

/// 8-Bit-Companding-Verfahren
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Companding {
    Ulaw,
    Alaw,
}

impl Companding {
    /// 8-Bit-Companding -> PCM16 little-endian (Laenge verdoppelt sich)
    pub fn expandieren(&self, eingabe: &[u8]) -> Vec<u8> {
        let tabelle = match self {
            Self::Ulaw => ulaw_tabelle(),
            Self::Alaw => alaw_tabelle(),
        };
        let mut pcm = Vec::with_capacity(eingabe.len() * 2);
        for &byte in eingabe {
            pcm.extend_from_slice(&tabelle[byte as usize].to_le_bytes());
        }
        pcm
    }

    /// PCM16 little-endian -> 8-Bit-Companding (Laenge halbiert sich)
    ///
    /// Ein ueberzaehliges letztes Byte wird ignoriert.
    pub fn komprimieren(&self, pcm: &[u8]) -> Vec<u8> {
        pcm.chunks_exact(2)
            .map(|s| {
                let sample = i16::from_le_bytes([s[0], s[1]]);
                match self {
                    Self::Ulaw => linear_zu_ulaw(sample),
                    Self::Alaw => linear_zu_alaw(sample),
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// μ-law
// ---------------------------------------------------------------------------

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// PCM16-Sample -> μ-law-Byte
pub fn linear_zu_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let vorzeichen = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    // Segment = Position des hoechsten gesetzten Bits ab Bit 7
    let mut exponent = 7;
    let mut maske = 0x4000;
    while exponent > 0 && pcm & maske == 0 {
        exponent -= 1;
        maske >>= 1;
    }
    let mantisse = (pcm >> (exponent + 3)) & 0x0F;

    !(vorzeichen | (exponent << 4) | mantisse) as u8
}

/// μ-law-Byte -> PCM16-Sample
pub fn ulaw_zu_linear(byte: u8) -> i16 {
    ulaw_tabelle()[byte as usize]
}

fn ulaw_berechnen(byte: u8) -> i16 {
    let u = !byte;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantisse = (u & 0x0F) as i32;
    let t = ((mantisse << 3) + ULAW_BIAS) << exponent;
    if u & 0x80 != 0 {
        (ULAW_BIAS - t) as i16
    } else {
        (t - ULAW_BIAS) as i16
    }
}

fn ulaw_tabelle() -> &'static [i16; 256] {
    static TABELLE: OnceLock<[i16; 256]> = OnceLock::new();
    TABELLE.get_or_init(|| std::array::from_fn(|i| ulaw_berechnen(i as u8)))
}

// ---------------------------------------------------------------------------
// A-law
// ---------------------------------------------------------------------------

/// Segment-Endpunkte fuer 13-Bit-Betraege
const ALAW_SEGMENT_ENDE: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

/// PCM16-Sample -> A-law-Byte
pub fn linear_zu_alaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 3;
    let maske = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    match ALAW_SEGMENT_ENDE.iter().position(|&ende| pcm <= ende) {
        None => (0x7F ^ maske) as u8,
        Some(segment) => {
            let segment = segment as i32;
            let quant = if segment < 2 {
                (pcm >> 1) & 0x0F
            } else {
                (pcm >> segment) & 0x0F
            };
            (((segment << 4) | quant) ^ maske) as u8
        }
    }
}

/// A-law-Byte -> PCM16-Sample
pub fn alaw_zu_linear(byte: u8) -> i16 {
    alaw_tabelle()[byte as usize]
}

fn alaw_berechnen(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let mut t = ((a & 0x0F) as i32) << 4;
    let segment = ((a & 0x70) >> 4) as i32;
    match segment {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= segment - 1;
        }
    }
    if a & 0x80 != 0 {
        t as i16
    } else {
        -t as i16
    }
}

fn alaw_tabelle() -> &'static [i16; 256] {
    static TABELLE: OnceLock<[i16; 256]> = OnceLock::new();
    TABELLE.get_or_init(|| std::array::from_fn(|i| alaw_berechnen(i as u8)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
