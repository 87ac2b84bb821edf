//! voxbridge-gateway – Audio-Eingang ueber zwei Transporte
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (AudioSocket)        WebSocket Listener (axum)
//!     |  [typ][laenge BE][payload]      |  /<praefix>/<id>/<encoding>
//!     v                                 v
//! Connection (Akkumulator, State Machine, Zaehler)
//!     |
//!     v
//! ProtocolGateway ── GatewayHandler (synchron, verlustfrei)
//!                 └─ broadcast ──> GatewayEvent
//!                                   (ConnectionOpened, HandshakeComplete,
//!                                    AudioFrame, ConnectionClosed, Error)
//! ```
//!
//! Ausgehendes Audio (`send_audio`) geht ueber eine begrenzte Queue an den
//! Schreib-Task der Verbindung und blockiert nie.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod gateway;
mod tcp;
pub mod websocket;

pub use config::GatewayConfig;
pub use connection::ConnectionState;
pub use error::{GatewayError, GatewayResult};
pub use events::{
    AudioFrame, ConnectionStats, GatewayEvent, GatewayHandler, GatewayStatistik,
    VerbindungsSnapshot,
};
pub use gateway::{Fortsetzung, ProtocolGateway};
pub use websocket::{pfad_aufloesen, WebSocketZiel};
