//! Fehlertypen fuer die StationPipeline

use thiserror::Error;

/// Fehlertyp fuer die StationPipeline
#[derive(Debug, Error)]
pub enum StationError {
    /// Verarbeitungsstufe ist fuer einen Frame fehlgeschlagen
    #[error("Verarbeitung fehlgeschlagen: {0}")]
    Verarbeitung(String),

    /// Senke hat einen Egress-Frame nicht angenommen
    #[error("Senke nicht verfuegbar: {0}")]
    Senke(String),

    /// Ungueltige Konfiguration
    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),
}

impl StationError {
    pub fn verarbeitung(msg: impl Into<String>) -> Self {
        Self::Verarbeitung(msg.into())
    }
}

/// Result-Typ fuer die StationPipeline
pub type StationResult<T> = Result<T, StationError>;
