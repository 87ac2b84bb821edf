//! Events einer StationPipeline

use serde::Serialize;
use voxbridge_core::StationId;

/// Schweregrad von Alerts und Log-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stufe {
    Info,
    Warnung,
    Fehler,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StationEvent {
    Started {
        station_id: StationId,
    },
    Stopped {
        station_id: StationId,
    },
    /// Betriebsrelevante Meldung (Ueberlauf, Verarbeitungsfehler)
    Alert {
        station_id: StationId,
        stufe: Stufe,
        nachricht: String,
    },
    ConfigUpdated {
        station_id: StationId,
        felder: Vec<&'static str>,
    },
    AudioSent {
        station_id: StationId,
        bytes: usize,
    },
    /// Lebenszyklus-Ereignis, z.B. `BUFFER_FLUSHED_ON_STOP`
    Event {
        station_id: StationId,
        stufe: Stufe,
        art: &'static str,
    },
}
