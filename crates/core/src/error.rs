//! Fehlertypen fuer Voxbridge
//!
//! Zentraler Fehler-Enum fuer komponentenuebergreifende Fehler.
//! Die Crates definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Voxbridge
pub type Result<T> = std::result::Result<T, VoxError>;

/// Komponentenuebergreifende Fehler im Voxbridge-System
#[derive(Debug, Error)]
pub enum VoxError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    // --- Protokoll ---
    #[error("Ungueltiger Frame: {0}")]
    UngueltigerFrame(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl VoxError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur die Verbindung betrifft
    /// (der Prozess laeuft weiter, die Verbindung wird abgebaut)
    pub fn betrifft_nur_verbindung(&self) -> bool {
        matches!(self, Self::Verbindung(_) | Self::Getrennt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = VoxError::Konfiguration("frame_size_bytes = 0".into());
        assert_eq!(e.to_string(), "Konfigurationsfehler: frame_size_bytes = 0");
    }

    #[test]
    fn verbindungsfehler_erkennung() {
        assert!(VoxError::Getrennt("eof".into()).betrifft_nur_verbindung());
        assert!(!VoxError::Audio("test".into()).betrifft_nur_verbindung());
    }
}
