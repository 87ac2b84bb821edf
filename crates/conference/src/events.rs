//! Events des ConferenceRouters

use voxbridge_core::{ParticipantId, RoomId};

#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    RoomCreated {
        room_id: RoomId,
        conference_id: String,
    },
    ParticipantJoined {
        room_id: RoomId,
        participant: ParticipantId,
        name: String,
        language: String,
        /// Teilnehmerzahl nach dem Beitritt
        count: usize,
    },
    ParticipantLeft {
        room_id: RoomId,
        participant: ParticipantId,
        /// Teilnehmerzahl nach dem Austritt
        count: usize,
    },
    ActiveSpeaker {
        room_id: RoomId,
        participant: ParticipantId,
        name: String,
    },
    RoomDestroyed {
        room_id: RoomId,
    },
}

impl ConferenceEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::RoomCreated { room_id, .. }
            | Self::ParticipantJoined { room_id, .. }
            | Self::ParticipantLeft { room_id, .. }
            | Self::ActiveSpeaker { room_id, .. }
            | Self::RoomDestroyed { room_id } => room_id,
        }
    }
}
