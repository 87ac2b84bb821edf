//! voxbridge-conference – Konferenzraeume mit Mix-Minus-Routing
//!
//! Der Router verwaltet nur die Routing-Tabelle (wer hoert wen). Das
//! eigentliche Mischen der Audiodaten uebernimmt ein externer Mixer, der
//! die Quellen aus `get_mix_minus_sources` summiert und ueber
//! `ProtocolGateway::send_audio` ausspielt.

pub mod error;
pub mod events;
pub mod participant;
pub mod room;
pub mod router;

pub use error::{ConferenceError, ConferenceResult};
pub use events::ConferenceEvent;
pub use participant::Participant;
pub use room::{ConferenceRoom, ParticipantStats, RoomStats};
pub use router::{ConferenceRouter, KonferenzStatistik};
