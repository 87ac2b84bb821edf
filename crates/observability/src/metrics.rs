//! Prometheus-kompatible Metriken fuer Voxbridge
//!
//! Registrierte Metriken:
//! - `voxbridge_connections_active` – Gauge: Offene Verbindungen
//! - `voxbridge_connections_total` – Counter: Angenommene Verbindungen
//! - `voxbridge_audio_frames_total` – Counter: Normalisierte Audio-Frames (transport)
//! - `voxbridge_protocol_errors_total` – Counter: Protokoll- und Transportfehler
//! - `voxbridge_pre_handshake_dropped_total` – Counter: Audio vor dem Handshake
//! - `voxbridge_station_dropped_bytes_total` – Counter: Verworfene Stations-Bytes
//! - `voxbridge_station_frames_sent_total` – Counter: Egress-Frames
//! - `voxbridge_rooms_active` – Gauge: Aktive Konferenzraeume
//! - `voxbridge_station_jitter_seconds` – Histogram: Ankunfts-Jitter

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct VoxbridgeMetrics {
    pub registry: Arc<Registry>,

    // Gateway
    pub connections_active: IntGauge,
    pub connections_total: IntCounter,
    pub audio_frames_total: IntCounterVec,
    pub protocol_errors_total: IntCounter,
    pub pre_handshake_dropped_total: IntCounter,

    // Stationen
    pub station_dropped_bytes_total: IntCounter,
    pub station_frames_sent_total: IntCounter,
    pub station_jitter_seconds: Histogram,

    // Konferenz
    pub rooms_active: IntGauge,
}

impl VoxbridgeMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Gateway ---
        let connections_active = IntGauge::with_opts(Opts::new(
            "voxbridge_connections_active",
            "Anzahl offener Verbindungen",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let connections_total = IntCounter::with_opts(Opts::new(
            "voxbridge_connections_total",
            "Gesamtanzahl angenommener Verbindungen",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let audio_frames_total = IntCounterVec::new(
            Opts::new(
                "voxbridge_audio_frames_total",
                "Normalisierte Audio-Frames je Transport",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(audio_frames_total.clone()))?;

        let protocol_errors_total = IntCounter::with_opts(Opts::new(
            "voxbridge_protocol_errors_total",
            "Protokoll- und Transportfehler",
        ))?;
        registry.register(Box::new(protocol_errors_total.clone()))?;

        let pre_handshake_dropped_total = IntCounter::with_opts(Opts::new(
            "voxbridge_pre_handshake_dropped_total",
            "Vor dem Handshake verworfene Audio-Frames",
        ))?;
        registry.register(Box::new(pre_handshake_dropped_total.clone()))?;

        // --- Stationen ---
        let station_dropped_bytes_total = IntCounter::with_opts(Opts::new(
            "voxbridge_station_dropped_bytes_total",
            "Von Stationen verworfene Bytes (Ueberlauf, Fehler, Stop)",
        ))?;
        registry.register(Box::new(station_dropped_bytes_total.clone()))?;

        let station_frames_sent_total = IntCounter::with_opts(Opts::new(
            "voxbridge_station_frames_sent_total",
            "Von Stationen ausgegebene Frames",
        ))?;
        registry.register(Box::new(station_frames_sent_total.clone()))?;

        let station_jitter_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "voxbridge_station_jitter_seconds",
                "Ankunfts-Jitter der Stationen in Sekunden",
            )
            .buckets(vec![0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1]),
        )?;
        registry.register(Box::new(station_jitter_seconds.clone()))?;

        // --- Konferenz ---
        let rooms_active = IntGauge::with_opts(Opts::new(
            "voxbridge_rooms_active",
            "Anzahl aktiver Konferenzraeume",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connections_active,
            connections_total,
            audio_frames_total,
            protocol_errors_total,
            pre_handshake_dropped_total,
            station_dropped_bytes_total,
            station_frames_sent_total,
            station_jitter_seconds,
            rooms_active,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: VoxbridgeMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<VoxbridgeMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
