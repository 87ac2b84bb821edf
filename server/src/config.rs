//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use voxbridge_core::VoxError;
use voxbridge_gateway::GatewayConfig;
use voxbridge_observability::logging::{log_format_gueltig, log_level_gueltig};
use voxbridge_station::StationConfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    /// Listener, Audioformat, Queue-Groessen
    pub gateway: GatewayConfig,
    /// Vorlage fuer jede neue Station
    pub station: StationConfig,
    pub konferenz: KonferenzEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    pub name: String,
    /// Kapazitaet des Kanals zwischen Stationen und ASR-Konsument
    pub downstream_kapazitaet: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Voxbridge".into(),
            downstream_kapazitaet: 1024,
        }
    }
}

/// Konferenz-Einstellungen fuer Teilnehmer des Message-Transports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KonferenzEinstellungen {
    /// Raum, dem Message-Teilnehmer beim Handshake beitreten
    pub raum: String,
    pub auto_beitreten: bool,
    /// Sprachcode fuer automatisch beigetretene Teilnehmer
    pub sprache: String,
}

impl Default for KonferenzEinstellungen {
    fn default() -> Self {
        Self {
            raum: "konferenz".into(),
            auto_beitreten: true,
            sprache: "und".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt und prueft die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Prueft Wertebereiche, die serde nicht abdeckt
    pub fn pruefen(&self) -> voxbridge_core::Result<()> {
        let fehler = |msg: String| Err(VoxError::Konfiguration(msg));

        if self.gateway.sample_rate == 0 {
            return fehler("gateway.sample_rate muss groesser 0 sein".into());
        }
        if self.gateway.frame_size_bytes == 0 || self.gateway.frame_size_bytes % 2 != 0 {
            return fehler(format!(
                "gateway.frame_size_bytes muss gerade und groesser 0 sein (ist {})",
                self.gateway.frame_size_bytes
            ));
        }
        if self.gateway.websocket_praefix.trim_matches('/').is_empty() {
            return fehler("gateway.websocket_praefix darf nicht leer sein".into());
        }
        if let Err(e) = self.station.pruefen() {
            return fehler(format!("station: {e}"));
        }
        if self.konferenz.auto_beitreten && self.konferenz.raum.is_empty() {
            return fehler("konferenz.raum darf bei auto_beitreten nicht leer sein".into());
        }
        if !log_level_gueltig(&self.logging.level) {
            return fehler(format!("logging.level ungueltig: {}", self.logging.level));
        }
        if !log_format_gueltig(&self.logging.format) {
            return fehler(format!("logging.format ungueltig: {}", self.logging.format));
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.gateway.bind_adresse, self.observability.port)
    }
}
