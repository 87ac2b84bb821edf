//! Health-Check-Endpunkt fuer Voxbridge
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Gateway-Zustand und
//! Anzahl offener Verbindungen.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub gateway_running: bool,
    pub active_connections: usize,
}

/// Geteilter Zustand; der Server setzt ihn, der Handler liest ihn
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    gateway_running: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            gateway_running: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn gateway_status_setzen(&self, laeuft: bool) {
        self.gateway_running.store(laeuft, Ordering::Relaxed);
    }

    pub fn verbindungen_setzen(&self, anzahl: usize) {
        self.active_connections.store(anzahl, Ordering::Relaxed);
    }

    pub fn bericht(&self) -> (StatusCode, HealthResponse) {
        let gateway_running = self.gateway_running.load(Ordering::Relaxed);
        let (http_status, status) = if gateway_running {
            (StatusCode::OK, HealthStatus::Healthy)
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unhealthy)
        };
        (
            http_status,
            HealthResponse {
                status,
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_seconds: self.uptime_seconds(),
                gateway_running,
                active_connections: self.active_connections.load(Ordering::Relaxed),
            },
        )
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, antwort) = state.bericht();
    (status, Json(antwort))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ohne_gateway_unhealthy() {
        let state = HealthState::neu();
        let (status, antwort) = state.bericht();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(antwort.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn gateway_laeuft() {
        let state = HealthState::neu();
        state.gateway_status_setzen(true);
        state.verbindungen_setzen(4);
        let (status, antwort) = state.clone().bericht();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(antwort.active_connections, 4);
        assert!(antwort.uptime_seconds < 5);
    }

    #[test]
    fn serialisierung() {
        let state = HealthState::neu();
        state.gateway_status_setzen(true);
        let json = serde_json::to_string(&state.bericht().1).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"gateway_running\":true"));
    }
}
