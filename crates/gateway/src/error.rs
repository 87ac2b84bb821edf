//! Fehlertypen fuer den ProtocolGateway

use thiserror::Error;
use voxbridge_core::ConnectionId;
use voxbridge_protocol::ProtocolError;

/// Fehlertyp fuer den Gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO-Fehler (Bind, Accept, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler im AudioSocket-Framing
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    /// Verbindung ist nicht (mehr) in der Tabelle
    #[error("Unbekannte Verbindung: {0}")]
    UnbekannteVerbindung(ConnectionId),

    /// Request-Pfad des WebSocket-Transports passt nicht zum Praefix
    #[error("Ungueltiger Pfad: {0}")]
    UngueltigerPfad(String),

    /// Encoding-Segment im Pfad wird nicht unterstuetzt
    #[error("Unbekanntes Encoding: {0}")]
    UnbekanntesEncoding(String),

    /// Gateway wurde bereits gestoppt
    #[error("Gateway gestoppt")]
    Gestoppt,
}

/// Result-Typ fuer den Gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protokollfehler_wird_konvertiert() {
        let e: GatewayError = ProtocolError::PayloadZuGross { laenge: 70_000 }.into();
        assert!(e.to_string().starts_with("Protokollfehler"));
    }
}
