//! Fehlertypen des ConferenceRouters
//!
//! Anlegen ist strikt (Duplikate, gesperrte Raeume), Aufraeumen ist
//! nachsichtig: das Entfernen unbekannter Teilnehmer ist kein Fehler
//! und taucht hier deshalb nicht auf.

use thiserror::Error;
use voxbridge_core::{ParticipantId, RoomId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConferenceError {
    #[error("Teilnehmer {participant} ist bereits in {room_id}")]
    DuplicateParticipant {
        room_id: RoomId,
        participant: ParticipantId,
    },

    #[error("Teilnehmer {participant} ist nicht in {room_id}")]
    UnknownParticipant {
        room_id: RoomId,
        participant: ParticipantId,
    },

    #[error("Unbekannter Raum: {0}")]
    UnknownRoom(RoomId),

    #[error("Raum existiert bereits: {0}")]
    RoomExists(RoomId),

    #[error("Raum ist gesperrt: {0}")]
    RoomLocked(RoomId),
}

pub type ConferenceResult<T> = Result<T, ConferenceError>;
