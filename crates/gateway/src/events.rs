//! Events und Statistiken des ProtocolGateway
//!
//! Zwei Wege zum Konsumenten: ein registrierter `GatewayHandler` (synchron,
//! verlustfrei) oder ein `tokio::sync::broadcast`-Abonnement, das bei
//! Rueckstau Events verwirft (`Lagged`).

use bytes::Bytes;
use serde::Serialize;
use std::net::SocketAddr;
use voxbridge_core::{ConnectionId, ParticipantId, TransportKind};

/// Ein normalisierter Audio-Frame (PCM16 LE mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub connection_id: ConnectionId,
    pub identity: ParticipantId,
    pub transport: TransportKind,
    pub pcm: Bytes,
    pub byte_length: usize,
    /// Ankunftszeit (Unix-Millisekunden)
    pub timestamp_ms: u64,
    /// Beginnt pro Verbindung bei 1
    pub sequence_number: u64,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

/// Abschluss-Statistik einer getrennten Verbindung
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub dauer_ms: u64,
    pub frames_gesamt: u64,
    pub audio_frames: u64,
    pub bytes_gesamt: u64,
    /// Durchschnittliche Frame-Rate ueber die gesamte Lebensdauer
    pub frames_pro_sekunde: f64,
    pub fehler: u64,
}

/// Events des Gateways
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    ConnectionOpened {
        connection_id: ConnectionId,
        transport: TransportKind,
        peer: SocketAddr,
        /// Nur beim Message-Transport bereits bekannt
        participant: Option<ParticipantId>,
    },
    HandshakeComplete {
        connection_id: ConnectionId,
        identity: ParticipantId,
    },
    AudioFrame(AudioFrame),
    ConnectionClosed {
        connection_id: ConnectionId,
        identity: Option<ParticipantId>,
        transport: TransportKind,
        stats: ConnectionStats,
    },
    Error {
        connection_id: ConnectionId,
        detail: String,
    },
}

/// Synchroner Empfaenger fuer Gateway-Events
///
/// Registrierte Handler laufen im Transport-Task der Verbindung, in
/// Eingangsreihenfolge und vor dem Broadcast. Anders als ein
/// Broadcast-Abonnent verpasst ein Handler kein Event. Die Methoden
/// duerfen nicht blockieren und den Gateway nur ueber seine
/// oeffentlichen Methoden ansprechen.
pub trait GatewayHandler: Send + Sync + 'static {
    fn verbindung_geoeffnet(
        &self,
        _connection_id: ConnectionId,
        _transport: TransportKind,
        _peer: SocketAddr,
    ) {
    }

    fn handshake_abgeschlossen(&self, _connection_id: ConnectionId, _identity: &ParticipantId) {}

    fn audio_frame(&self, _frame: &AudioFrame) {}

    fn verbindung_geschlossen(
        &self,
        _connection_id: ConnectionId,
        _identity: Option<&ParticipantId>,
        _stats: &ConnectionStats,
    ) {
    }

    fn fehler(&self, _connection_id: ConnectionId, _detail: &str) {}
}

impl GatewayEvent {
    /// Ruft die passende Handler-Methode auf
    pub fn zustellen(&self, handler: &dyn GatewayHandler) {
        match self {
            Self::ConnectionOpened {
                connection_id,
                transport,
                peer,
                ..
            } => handler.verbindung_geoeffnet(*connection_id, *transport, *peer),
            Self::HandshakeComplete {
                connection_id,
                identity,
            } => handler.handshake_abgeschlossen(*connection_id, identity),
            Self::AudioFrame(frame) => handler.audio_frame(frame),
            Self::ConnectionClosed {
                connection_id,
                identity,
                stats,
                ..
            } => handler.verbindung_geschlossen(*connection_id, identity.as_ref(), stats),
            Self::Error {
                connection_id,
                detail,
            } => handler.fehler(*connection_id, detail),
        }
    }
}

/// Momentaufnahme einer aktiven Verbindung
#[derive(Debug, Clone, Serialize)]
pub struct VerbindungsSnapshot {
    pub connection_id: ConnectionId,
    pub transport: TransportKind,
    pub identity: Option<ParticipantId>,
    pub peer: SocketAddr,
    pub frames_gesamt: u64,
    pub audio_frames: u64,
    pub bytes_gesamt: u64,
    pub uptime_ms: u64,
    pub frames_pro_sekunde: f64,
}

/// Aggregierte Gateway-Statistik
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayStatistik {
    pub verbindungen_gesamt: u64,
    pub verbindungen_aktiv: usize,
    pub audio_frames_gesamt: u64,
    pub bytes_gesamt: u64,
    pub fehler: u64,
    pub vor_handshake_verworfen: u64,
    pub verbindungen: Vec<VerbindungsSnapshot>,
}
