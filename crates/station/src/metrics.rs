//! Zaehler und Metrik-Snapshot einer Station

use serde::Serialize;
use voxbridge_core::StationId;

use crate::config::StationConfig;

/// Laufende Zaehler (nur unter dem Stations-Mutex veraendert)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationZaehler {
    pub packets_received: u64,
    pub packets_processed: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub bytes_received: u64,
    pub bytes_processed: u64,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
    pub verarbeitungszeit_gesamt_ms: f64,
    pub last_packet_ms: Option<u64>,
}

impl StationZaehler {
    /// Laufender Mittelwert der Verarbeitungslatenz
    pub fn avg_latency_ms(&self) -> f64 {
        if self.packets_processed == 0 {
            return 0.0;
        }
        self.verarbeitungszeit_gesamt_ms / self.packets_processed as f64
    }
}

/// Momentaufnahme fuer Monitoring
#[derive(Debug, Clone, Serialize)]
pub struct StationMetriken {
    pub station_id: StationId,
    pub enabled: bool,
    pub running: bool,
    pub uptime_ms: u64,
    pub packets_received: u64,
    pub packets_processed: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub bytes_received: u64,
    pub bytes_processed: u64,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
    pub buffer_fill_bytes: usize,
    pub buffer_fill_percent: f64,
    pub avg_latency_ms: f64,
    pub jitter_ms: f64,
    pub last_packet_ms: Option<u64>,
    pub prozessor: &'static str,
    pub config: StationConfig,
}
