//! voxbridge-protocol – Wire-Formate und Audio-Konvertierung
//!
//! - [`wire`] – AudioSocket-Framing (Typ + 16-Bit-Laenge + Payload)
//! - [`codec`] – G.711 μ-law/A-law Companding (CodecBridge)
//! - [`pcm`] – PCM16-Hilfen (Gain, Audio-Format, Frame-Dauer)

pub mod codec;
pub mod pcm;
pub mod wire;

pub use codec::{Companding, Encoding};
pub use pcm::AudioFormat;
pub use wire::{AudioSocketCodec, AudioSocketFrame, FrameType, ProtocolError};
