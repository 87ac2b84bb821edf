//! Konferenz-Teilnehmer

use chrono::{DateTime, Utc};
use serde::Serialize;
use voxbridge_core::ParticipantId;

/// Ein Teilnehmer in genau einem Raum
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Sprachcode, z.B. "de" oder "en-US"
    pub language: String,
    /// Externer Kanal-Bezug (z.B. die ConnectionId als Text)
    pub channel: String,
    pub joined_at: DateTime<Utc>,
    pub speaking: bool,
}

impl Participant {
    pub fn neu(
        id: ParticipantId,
        name: impl Into<String>,
        language: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            language: language.into(),
            channel: channel.into(),
            joined_at: Utc::now(),
            speaking: false,
        }
    }

    /// Millisekunden seit dem Beitritt
    pub fn dauer_ms(&self) -> u64 {
        millis_seit(self.joined_at)
    }
}

pub(crate) fn millis_seit(zeitpunkt: DateTime<Utc>) -> u64 {
    (Utc::now() - zeitpunkt).num_milliseconds().max(0) as u64
}
