//! Stations-Konfiguration und partielle Updates
//!
//! `StationConfig` wird beim Erstellen uebergeben und kann zur Laufzeit
//! ueber `StationConfigUpdate` feldweise ueberschrieben werden. Beide
//! Typen sind serde-faehig, damit dieselbe Form aus der TOML-Datei oder
//! aus einem Laufzeit-Update kommen kann.

use serde::{Deserialize, Serialize};

use crate::error::{StationError, StationResult};

/// Verhalten bei vollem Ausgangspuffer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Aelteste Bytes verwerfen, neue vollstaendig anhaengen
    #[default]
    DropOldest,
    /// Eingehende Bytes verwerfen, Puffer bleibt unveraendert
    DropNewest,
}

/// Parameter einer Station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub max_buffer_bytes: usize,
    pub frame_size_bytes: usize,
    /// Egress-Intervall; 0 = kein Timer
    pub frame_delay_ms: u64,
    pub overflow_policy: OverflowPolicy,
    pub input_gain: f32,
    pub enabled: bool,
    /// Ueberschreibt `frame_size_bytes` als Egress-Schwelle
    pub buffer_accumulation_threshold_bytes: Option<usize>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 262_144,
            frame_size_bytes: 320,
            frame_delay_ms: 20,
            overflow_policy: OverflowPolicy::DropOldest,
            input_gain: 1.0,
            enabled: true,
            buffer_accumulation_threshold_bytes: None,
        }
    }
}

impl StationConfig {
    /// Anzahl Bytes, die pro Egress-Tick mindestens im Puffer liegen muessen
    pub fn egress_schwelle(&self) -> usize {
        self.buffer_accumulation_threshold_bytes
            .filter(|&t| t > 0)
            .unwrap_or(self.frame_size_bytes)
    }

    pub fn pruefen(&self) -> StationResult<()> {
        if self.frame_size_bytes == 0 {
            return Err(StationError::Konfiguration(
                "frame_size_bytes muss groesser 0 sein".into(),
            ));
        }
        if self.max_buffer_bytes < self.egress_schwelle() {
            return Err(StationError::Konfiguration(format!(
                "max_buffer_bytes ({}) kleiner als Egress-Schwelle ({})",
                self.max_buffer_bytes,
                self.egress_schwelle()
            )));
        }
        if !self.input_gain.is_finite() || self.input_gain < 0.0 {
            return Err(StationError::Konfiguration(format!(
                "input_gain ungueltig: {}",
                self.input_gain
            )));
        }
        Ok(())
    }

    /// Uebernimmt alle gesetzten Felder und liefert deren Namen
    pub fn anwenden(&mut self, update: &StationConfigUpdate) -> Vec<&'static str> {
        let mut geaendert = Vec::new();
        if let Some(v) = update.max_buffer_bytes {
            self.max_buffer_bytes = v;
            geaendert.push("max_buffer_bytes");
        }
        if let Some(v) = update.frame_size_bytes {
            self.frame_size_bytes = v;
            geaendert.push("frame_size_bytes");
        }
        if let Some(v) = update.frame_delay_ms {
            self.frame_delay_ms = v;
            geaendert.push("frame_delay_ms");
        }
        if let Some(v) = update.overflow_policy {
            self.overflow_policy = v;
            geaendert.push("overflow_policy");
        }
        if let Some(v) = update.input_gain {
            self.input_gain = v;
            geaendert.push("input_gain");
        }
        if let Some(v) = update.enabled {
            self.enabled = v;
            geaendert.push("enabled");
        }
        if let Some(v) = update.buffer_accumulation_threshold_bytes {
            self.buffer_accumulation_threshold_bytes = Some(v);
            geaendert.push("buffer_accumulation_threshold_bytes");
        }
        geaendert
    }
}

/// Partielle Konfiguration; nur gesetzte Felder werden uebernommen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfigUpdate {
    pub max_buffer_bytes: Option<usize>,
    pub frame_size_bytes: Option<usize>,
    pub frame_delay_ms: Option<u64>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub input_gain: Option<f32>,
    pub enabled: Option<bool>,
    pub buffer_accumulation_threshold_bytes: Option<usize>,
}
