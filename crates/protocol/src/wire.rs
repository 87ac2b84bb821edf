//! Wire-Format fuer den Stream-Transport (AudioSocket)
//!
//! Frame-basiertes Protokoll ueber eine persistente TCP-Verbindung.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+----...----+
//! |  Typ   | Laenge (u16 BE) | Payload    |
//! +--------+--------+--------+----...----+
//! ```
//!
//! Typ-Codes: `0x00` HANGUP, `0x01` UUID, `0x10` AUDIO, `0xFF` ERROR.
//! Unbekannte Typen werden toleriert (vorwaertskompatibel).
//! Die Laenge ist hart auf 65535 Bytes begrenzt; groessere Payloads werden
//! beim Kodieren abgelehnt, nie abgeschnitten.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::Encoder;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesse des Headers (1 Byte Typ + 2 Bytes Laenge)
pub const HEADER_SIZE: usize = 3;

/// Maximale Payload-Laenge (u16)
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Kodieren/Dekodieren von AudioSocket-Frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload passt nicht in das 16-Bit-Laengenfeld
    #[error("Payload zu gross: {laenge} Bytes (Maximum: 65535 Bytes)")]
    PayloadZuGross { laenge: usize },

    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// FrameType
// ---------------------------------------------------------------------------

/// Typ-Byte eines AudioSocket-Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Hangup,
    Uuid,
    Audio,
    Error,
    /// Unbekannter Typ – wird toleriert
    Unbekannt(u8),
}

impl FrameType {
    pub const HANGUP: u8 = 0x00;
    pub const UUID: u8 = 0x01;
    pub const AUDIO: u8 = 0x10;
    pub const ERROR: u8 = 0xFF;

    /// Konvertiert ein Byte in einen `FrameType` (nie fehlschlagend)
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            Self::HANGUP => Self::Hangup,
            Self::UUID => Self::Uuid,
            Self::AUDIO => Self::Audio,
            Self::ERROR => Self::Error,
            andere => Self::Unbekannt(andere),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Hangup => Self::HANGUP,
            Self::Uuid => Self::UUID,
            Self::Audio => Self::AUDIO,
            Self::Error => Self::ERROR,
            Self::Unbekannt(b) => *b,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioSocketFrame
// ---------------------------------------------------------------------------

/// Ein vollstaendig empfangener AudioSocket-Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSocketFrame {
    /// Verbindung ordnungsgemaess beenden
    Hangup,
    /// Identitaet (UTF-8, bereits getrimmt)
    Uuid(String),
    /// PCM16 little-endian mono
    Audio(Bytes),
    /// Diagnosetext der Gegenseite
    Error(String),
    /// Unbekannter Frame-Typ mit Roh-Payload
    Unbekannt { typ: u8, payload: Bytes },
}

impl AudioSocketFrame {
    /// Baut einen Frame aus Typ-Byte und Payload
    pub fn aus_teilen(typ: u8, payload: Bytes) -> Self {
        match FrameType::from_u8(typ) {
            FrameType::Hangup => Self::Hangup,
            FrameType::Uuid => Self::Uuid(text_dekodieren(&payload).trim().to_string()),
            FrameType::Audio => Self::Audio(payload),
            FrameType::Error => Self::Error(text_dekodieren(&payload).into_owned()),
            FrameType::Unbekannt(typ) => Self::Unbekannt { typ, payload },
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Hangup => FrameType::Hangup,
            Self::Uuid(_) => FrameType::Uuid,
            Self::Audio(_) => FrameType::Audio,
            Self::Error(_) => FrameType::Error,
            Self::Unbekannt { typ, .. } => FrameType::Unbekannt(*typ),
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Hangup => &[],
            Self::Uuid(text) | Self::Error(text) => text.as_bytes(),
            Self::Audio(pcm) => pcm,
            Self::Unbekannt { payload, .. } => payload,
        }
    }

    /// Gibt die Payload-Laenge zurueck
    pub fn payload_laenge(&self) -> usize {
        self.payload().len()
    }
}

fn text_dekodieren(payload: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(payload)
}

// ---------------------------------------------------------------------------
// AudioSocketCodec
// ---------------------------------------------------------------------------

/// tokio-util Encoder fuer AudioSocket-Frames
///
/// Die Eingangsseite (`naechster_frame`) arbeitet direkt auf einem
/// Akkumulator (`BytesMut`): ein unvollstaendiger Frame bleibt unangetastet
/// im Buffer, bis genug Bytes nachgeliefert wurden. Es wird nie ein
/// Teil-Frame ausgegeben oder verworfen.
#[derive(Debug, Clone, Default)]
pub struct AudioSocketCodec;

impl AudioSocketCodec {
    pub fn new() -> Self {
        Self
    }

    /// Entnimmt den naechsten vollstaendigen Frame aus dem Akkumulator
    ///
    /// Jeder Typ-Code und jede Laenge bis 65535 ist gueltig, das Zerlegen
    /// kann also nicht fehlschlagen. `None` heisst: zu wenige Bytes.
    pub fn naechster_frame(src: &mut BytesMut) -> Option<AudioSocketFrame> {
        if src.len() < HEADER_SIZE {
            return None;
        }

        // Header lesen ohne den Buffer zu veraendern
        let typ = src[0];
        let laenge = u16::from_be_bytes([src[1], src[2]]) as usize;

        let gesamt = HEADER_SIZE + laenge;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return None;
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(laenge).freeze();
        Some(AudioSocketFrame::aus_teilen(typ, payload))
    }
}

impl Encoder<AudioSocketFrame> for AudioSocketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: AudioSocketFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadZuGross {
                laenge: payload.len(),
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u8(item.frame_type().as_u8());
        dst.put_u16(payload.len() as u16);
        dst.put_slice(payload);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roh_frame(typ: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![typ];
        v.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn frame_type_bekannte_codes() {
        assert_eq!(FrameType::from_u8(0x00), FrameType::Hangup);
        assert_eq!(FrameType::from_u8(0x01), FrameType::Uuid);
        assert_eq!(FrameType::from_u8(0x10), FrameType::Audio);
        assert_eq!(FrameType::from_u8(0xFF), FrameType::Error);
        assert_eq!(FrameType::from_u8(0x42), FrameType::Unbekannt(0x42));
        assert_eq!(FrameType::Unbekannt(0x42).as_u8(), 0x42);
    }

    #[test]
    fn zerlegen_wartet_auf_header() {
        let mut buf = BytesMut::from(&[0x10, 0x01][..]);
        assert!(AudioSocketCodec::naechster_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 2, "Teil-Header darf nicht verbraucht werden");
    }

    #[test]
    fn zerlegen_unvollstaendiger_frame_bleibt_im_buffer() {
        let frame = roh_frame(0x10, &[7u8; 320]);
        let mut buf = BytesMut::from(&frame[..200]);

        assert!(AudioSocketCodec::naechster_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 200);

        buf.extend_from_slice(&frame[200..]);
        let decoded = AudioSocketCodec::naechster_frame(&mut buf).expect("Frame erwartet");
        assert_eq!(decoded, AudioSocketFrame::Audio(Bytes::from(vec![7u8; 320])));
        assert!(buf.is_empty());
    }

    #[test]
    fn zerlegen_mehrere_frames_in_einer_lieferung() {
        let mut daten = roh_frame(0x01, b"  abc-123\n");
        daten.extend(roh_frame(0x10, &[1u8; 4]));
        daten.extend(roh_frame(0x00, &[]));
        let mut buf = BytesMut::from(&daten[..]);

        assert_eq!(
            AudioSocketCodec::naechster_frame(&mut buf),
            Some(AudioSocketFrame::Uuid("abc-123".into()))
        );
        assert!(matches!(
            AudioSocketCodec::naechster_frame(&mut buf),
            Some(AudioSocketFrame::Audio(p)) if p.len() == 4
        ));
        assert_eq!(AudioSocketCodec::naechster_frame(&mut buf), Some(AudioSocketFrame::Hangup));
        assert!(AudioSocketCodec::naechster_frame(&mut buf).is_none());
    }

    #[test]
    fn zerlegen_toleriert_unbekannte_typen_und_ungueltiges_utf8() {
        let mut daten = roh_frame(0x42, &[9, 9]);
        daten.extend(roh_frame(0xFF, &[0xC3, 0x28]));
        let mut buf = BytesMut::from(&daten[..]);

        assert_eq!(
            AudioSocketCodec::naechster_frame(&mut buf),
            Some(AudioSocketFrame::Unbekannt {
                typ: 0x42,
                payload: Bytes::from_static(&[9, 9])
            })
        );
        assert!(matches!(
            AudioSocketCodec::naechster_frame(&mut buf),
            Some(AudioSocketFrame::Error(_))
        ));
    }

    #[test]
    fn encoder_schreibt_header() {
        let mut dst = BytesMut::new();
        AudioSocketCodec::new()
            .encode(AudioSocketFrame::Audio(Bytes::from(vec![0xAB; 320])), &mut dst)
            .unwrap();
        assert_eq!(dst.len(), HEADER_SIZE + 320);
        assert_eq!(dst[0], 0x10);
        assert_eq!(u16::from_be_bytes([dst[1], dst[2]]), 320);
    }

    #[test]
    fn zu_grosse_payload_wird_abgelehnt() {
        let gross = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let mut codec = AudioSocketCodec::new();
        let mut dst = BytesMut::new();
        let result = codec.encode(AudioSocketFrame::Audio(Bytes::from(gross)), &mut dst);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadZuGross { laenge }) if laenge == MAX_PAYLOAD_SIZE + 1
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn maximale_payload_ist_erlaubt() {
        let mut dst = BytesMut::new();
        AudioSocketCodec::new()
            .encode(
                AudioSocketFrame::Audio(Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE])),
                &mut dst,
            )
            .unwrap();
        assert_eq!(u16::from_be_bytes([dst[1], dst[2]]), u16::MAX);
    }
}
