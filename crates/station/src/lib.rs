//! voxbridge-station – eine Verarbeitungs-Pipeline pro Endpunkt
//!
//! ```text
//! process_audio(pcm)
//!     |  Jitter-Messung, Zaehler
//!     v
//! AudioProcessor (Standard: Eingangsverstaerkung)
//!     |
//!     v
//! OutputBuffer (max_buffer_bytes, drop_oldest | drop_newest)
//!     |
//!     v  Egress-Timer alle frame_delay_ms, genau ein Frame pro Tick
//! FrameSink (z.B. mpsc-Kanal zum ASR)
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod jitter;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod sink;

pub use buffer::{Anhaengen, OutputBuffer};
pub use config::{OverflowPolicy, StationConfig, StationConfigUpdate};
pub use error::{StationError, StationResult};
pub use events::{StationEvent, Stufe};
pub use jitter::JitterTracker;
pub use metrics::StationMetriken;
pub use pipeline::{Lebenszyklus, StationPipeline};
pub use processor::{AudioProcessor, GainProcessor};
pub use sink::{ChannelSink, EgressFrame, FrameSink};
