//! Senken fuer Egress-Frames
//!
//! Die Senke ist die Grenze zum nachgelagerten Konsumenten (ASR, Socket).
//! Sie darf nicht blockieren.

use bytes::Bytes;
use tokio::sync::mpsc;
use voxbridge_core::StationId;

use crate::error::{StationError, StationResult};

/// Ein Frame, den eine Station ausgegeben hat
#[derive(Debug, Clone)]
pub struct EgressFrame {
    pub station_id: StationId,
    pub pcm: Bytes,
}

pub trait FrameSink: Send + Sync + 'static {
    fn senden(&self, station_id: &StationId, pcm: Bytes) -> StationResult<()>;
}

/// Reicht Egress-Frames an einen begrenzten mpsc-Kanal weiter
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EgressFrame>,
}

impl ChannelSink {
    /// Erzeugt Senke und zugehoerigen Empfaenger
    pub fn kanal(kapazitaet: usize) -> (Self, mpsc::Receiver<EgressFrame>) {
        let (tx, rx) = mpsc::channel(kapazitaet.max(1));
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn senden(&self, station_id: &StationId, pcm: Bytes) -> StationResult<()> {
        self.tx
            .try_send(EgressFrame {
                station_id: station_id.clone(),
                pcm,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => StationError::Senke("Kanal voll".into()),
                mpsc::error::TrySendError::Closed(_) => {
                    StationError::Senke("Kanal geschlossen".into())
                }
            })
    }
}
