//! voxbridge-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Gateway, Stationen und
//! Konferenz-Router gemeinsam nutzen: ID-Newtypes, Transport-Art und den
//! zentralen Fehler-Enum.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, VoxError};
pub use types::{jetzt_ms, ConnectionId, ParticipantId, RoomId, StationId, TransportKind};
