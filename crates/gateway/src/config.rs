//! Gateway-Konfiguration

use serde::{Deserialize, Serialize};
use voxbridge_protocol::AudioFormat;

/// Konfiguration des ProtocolGateway (`[gateway]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_adresse: String,
    /// AudioSocket (TCP); 0 = vom Betriebssystem vergeben
    pub tcp_port: u16,
    pub websocket_port: u16,
    /// Erstes Pfadsegment des WebSocket-Transports (`/<praefix>/<id>/<encoding>`)
    pub websocket_praefix: String,
    pub sample_rate: u32,
    pub frame_size_bytes: usize,
    /// Kapazitaet des Broadcast-Kanals fuer Gateway-Events
    pub event_kapazitaet: usize,
    /// Ausgehende Queue pro Verbindung (in Nachrichten)
    pub sende_queue_kapazitaet: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".to_string(),
            tcp_port: 5050,
            websocket_port: 5051,
            websocket_praefix: "mic".to_string(),
            sample_rate: 8000,
            frame_size_bytes: 320,
            event_kapazitaet: 4096,
            sende_queue_kapazitaet: 256,
        }
    }
}

impl GatewayConfig {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.frame_size_bytes)
    }

    pub fn tcp_bind(&self) -> String {
        format!("{}:{}", self.bind_adresse, self.tcp_port)
    }

    pub fn websocket_bind(&self) -> String {
        format!("{}:{}", self.bind_adresse, self.websocket_port)
    }
}
