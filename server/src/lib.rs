//! voxbridge-server – Bibliotheks-Root
//!
//! Verdrahtet Gateway, Stationen, Konferenz-Router und Observability.
//!
//! ```text
//! ProtocolGateway ── GatewayHandler ──> Server (synchron, verlustfrei)
//!                                       |  HandshakeComplete -> Station anlegen,
//!                                       |                       ggf. Raum beitreten
//!                                       |  AudioFrame        -> process_audio
//!                                       |  ConnectionClosed  -> Station stoppen,
//!                                       v                       Raum verlassen
//!                                   StationPipeline ── EgressFrame ──> Downstream (ASR)
//! ```

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use voxbridge_conference::ConferenceRouter;
use voxbridge_core::{ConnectionId, ParticipantId, RoomId, StationId, TransportKind};
use voxbridge_gateway::{AudioFrame, ConnectionStats, GatewayHandler, ProtocolGateway};
use voxbridge_observability::{HealthState, VoxbridgeMetrics};
use voxbridge_station::{ChannelSink, EgressFrame, StationPipeline};

/// Zustand einer Verbindung nach dem Handshake
struct Sitzung {
    identity: ParticipantId,
    station: Option<StationPipeline>,
    raum: Option<RoomId>,
}

/// Haelt den laufenden Server-Zustand zusammen
///
/// Clone teilt den Zustand.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    gateway: ProtocolGateway,
    konferenz: ConferenceRouter,
    metriken: VoxbridgeMetrics,
    health: HealthState,
    /// Transport jeder offenen Verbindung (ab ConnectionOpened)
    transporte: DashMap<ConnectionId, TransportKind>,
    sitzungen: DashMap<ConnectionId, Sitzung>,
    senke: ChannelSink,
    downstream_rx: Mutex<Option<mpsc::Receiver<EgressFrame>>>,
    /// Zuletzt an Prometheus gemeldeter Stand des Gateway-Zaehlers
    gemeldet_vor_handshake: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let metriken = VoxbridgeMetrics::neu()?;
        let (senke, downstream_rx) = ChannelSink::kanal(config.server.downstream_kapazitaet);
        let (shutdown_tx, _) = watch::channel(false);
        let inner = Arc::new(ServerInner {
            gateway: ProtocolGateway::neu(config.gateway.clone()),
            konferenz: ConferenceRouter::neu(),
            metriken,
            health: HealthState::neu(),
            transporte: DashMap::new(),
            sitzungen: DashMap::new(),
            senke,
            downstream_rx: Mutex::new(Some(downstream_rx)),
            gemeldet_vor_handshake: AtomicU64::new(0),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            config,
        });
        // Weak: der Gateway lebt in ServerInner und darf ihn nicht festhalten
        inner.gateway.handler_registrieren(Arc::new(EreignisBruecke {
            server: Arc::downgrade(&inner),
        }));
        Ok(Self { inner })
    }

    pub fn gateway(&self) -> &ProtocolGateway {
        &self.inner.gateway
    }

    pub fn konferenz(&self) -> &ConferenceRouter {
        &self.inner.konferenz
    }

    pub fn metriken(&self) -> &VoxbridgeMetrics {
        &self.inner.metriken
    }

    pub fn sitzungen_anzahl(&self) -> usize {
        self.inner.sitzungen.len()
    }

    /// Station einer Verbindung (nach dem Handshake)
    pub fn station(&self, connection_id: ConnectionId) -> Option<StationPipeline> {
        self.inner
            .sitzungen
            .get(&connection_id)
            .and_then(|s| s.station.clone())
    }

    /// Uebernimmt den Empfaenger der Egress-Frames
    ///
    /// Muss vor `starten()` aufgerufen werden; sonst verwirft der Server
    /// die Frames nach einem trace-Log selbst.
    pub fn downstream_uebernehmen(&self) -> Option<mpsc::Receiver<EgressFrame>> {
        self.inner.downstream_rx.lock().take()
    }

    /// Startet alle Subsysteme und kehrt danach zurueck
    ///
    /// Reihenfolge:
    /// 1. Gateway-Listener (TCP + WebSocket) starten
    /// 2. Downstream-Konsument (falls nicht uebernommen)
    /// 3. Observability-Server (falls aktiviert)
    ///
    /// Gateway-Events kommen ueber den in `neu()` registrierten Handler.
    pub async fn starten(&self) -> Result<()> {
        self.inner.gateway.starten().await?;
        self.inner.health.gateway_status_setzen(true);

        tracing::info!(
            name = %self.inner.config.server.name,
            tcp = ?self.inner.gateway.tcp_adresse(),
            websocket = ?self.inner.gateway.websocket_adresse(),
            "Server gestartet"
        );

        let mut tasks = Vec::new();
        if let Some(rx) = self.downstream_uebernehmen() {
            tasks.push(tokio::spawn(downstream_schleife(
                rx,
                self.inner.metriken.clone(),
                self.inner.shutdown_tx.subscribe(),
            )));
        }

        if self.inner.config.observability.aktiviert {
            let adresse: SocketAddr = self.inner.config.observability_bind_adresse().parse()?;
            let metriken = self.inner.metriken.clone();
            let health = self.inner.health.clone();
            let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let signal = async move {
                    let _ = shutdown_rx.wait_for(|s| *s).await;
                };
                if let Err(e) = voxbridge_observability::observability_server_starten(
                    adresse, metriken, health, signal,
                )
                .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }));
        }

        self.inner.tasks.lock().extend(tasks);
        Ok(())
    }

    /// Startet den Server und laeuft bis Ctrl-C
    pub async fn laufen(&self) -> Result<()> {
        self.starten().await?;
        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        self.herunterfahren().await;
        Ok(())
    }

    /// Geordneter Shutdown: Stationen, Raeume, Gateway, Hintergrund-Tasks
    pub async fn herunterfahren(&self) {
        let ids: Vec<ConnectionId> = self.inner.sitzungen.iter().map(|s| *s.key()).collect();
        for id in ids {
            self.sitzung_entfernen(id);
        }

        self.inner.konferenz.shutdown();
        self.inner.gateway.stoppen().await;
        self.inner.health.gateway_status_setzen(false);
        self.metriken_abgleichen();

        self.inner.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("Server heruntergefahren");
    }

    // -----------------------------------------------------------------------
    // Event-Verarbeitung
    // -----------------------------------------------------------------------

    fn verbindung_geoeffnet(&self, connection_id: ConnectionId, transport: TransportKind) {
        self.inner.transporte.insert(connection_id, transport);
        self.inner.metriken.connections_total.inc();
        self.metriken_abgleichen();
    }

    fn gateway_fehler(&self, connection_id: ConnectionId, detail: &str) {
        tracing::debug!(connection_id = %connection_id, detail = %detail, "Gateway-Fehler");
        self.inner.metriken.protocol_errors_total.inc();
        self.metriken_abgleichen();
    }

    fn sitzung_anlegen(&self, connection_id: ConnectionId, identity: ParticipantId) {
        let station_id = StationId::new(format!("{}@{}", identity, connection_id.inner()));
        let station = match StationPipeline::neu(
            station_id,
            self.inner.config.station.clone(),
            self.inner.senke.clone(),
        ) {
            Ok(station) => {
                station.start();
                Some(station)
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, fehler = %e, "Station konnte nicht erstellt werden");
                None
            }
        };

        let transport = self.inner.transporte.get(&connection_id).map(|t| *t);
        let konferenz = &self.inner.config.konferenz;
        let raum = if transport == Some(TransportKind::Message) && konferenz.auto_beitreten {
            let raum = RoomId::new(konferenz.raum.clone());
            match self.inner.konferenz.add_participant(
                &raum,
                identity.clone(),
                identity.as_str(),
                konferenz.sprache.as_str(),
                connection_id.to_string(),
            ) {
                Ok(_) => Some(raum),
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, fehler = %e, "Raumbeitritt fehlgeschlagen");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            connection_id = %connection_id,
            identity = %identity,
            raum = ?raum,
            "Sitzung angelegt"
        );
        self.inner.sitzungen.insert(
            connection_id,
            Sitzung {
                identity,
                station,
                raum,
            },
        );
        // Parallel getrennt (z.B. durch stoppen()): ConnectionClosed kam
        // schon vor dem Einfuegen an
        if !self.inner.gateway.ist_verbunden(connection_id) {
            self.sitzung_entfernen(connection_id);
        }
        self.inner
            .metriken
            .rooms_active
            .set(self.inner.konferenz.raum_anzahl() as i64);
    }

    fn audio_weiterleiten(&self, frame: &AudioFrame) {
        self.inner
            .metriken
            .audio_frames_total
            .with_label_values(&[frame.transport.as_str()])
            .inc();

        let station = self
            .inner
            .sitzungen
            .get(&frame.connection_id)
            .and_then(|s| s.station.clone());
        match station {
            Some(station) => {
                station.process_audio(&frame.pcm);
            }
            None => tracing::trace!(
                connection_id = %frame.connection_id,
                seq = frame.sequence_number,
                "Audio-Frame ohne Station"
            ),
        }
    }

    fn sitzung_beenden(
        &self,
        connection_id: ConnectionId,
        identity: Option<&ParticipantId>,
        stats: &ConnectionStats,
    ) {
        self.inner.transporte.remove(&connection_id);
        if self.sitzung_entfernen(connection_id) {
            tracing::info!(
                connection_id = %connection_id,
                identity = ?identity,
                dauer_ms = stats.dauer_ms,
                audio_frames = stats.audio_frames,
                fps = stats.frames_pro_sekunde,
                fehler = stats.fehler,
                "Sitzung beendet"
            );
        }
        self.metriken_abgleichen();
    }

    /// Stoppt die Station und verlaesst den Raum; `false` ohne Sitzung
    fn sitzung_entfernen(&self, connection_id: ConnectionId) -> bool {
        let Some((_, sitzung)) = self.inner.sitzungen.remove(&connection_id) else {
            return false;
        };
        if let Some(station) = &sitzung.station {
            self.station_abschliessen(station);
        }
        if let Some(raum) = &sitzung.raum {
            self.inner.konferenz.remove_participant(raum, &sitzung.identity);
        }
        true
    }

    fn station_abschliessen(&self, station: &StationPipeline) {
        station.stop();
        let m = station.metriken();
        self.inner
            .metriken
            .station_dropped_bytes_total
            .inc_by(m.bytes_dropped);
        self.inner
            .metriken
            .station_jitter_seconds
            .observe(m.jitter_ms / 1000.0);
    }

    /// Gauges und abgeleitete Zaehler mit dem Gateway-Zustand abgleichen
    fn metriken_abgleichen(&self) {
        let stats = self.inner.gateway.statistik();
        let metriken = &self.inner.metriken;
        metriken
            .connections_active
            .set(stats.verbindungen_aktiv as i64);
        metriken
            .rooms_active
            .set(self.inner.konferenz.raum_anzahl() as i64);
        self.inner.health.verbindungen_setzen(stats.verbindungen_aktiv);

        let vorher = self
            .inner
            .gemeldet_vor_handshake
            .fetch_max(stats.vor_handshake_verworfen, Ordering::Relaxed);
        if stats.vor_handshake_verworfen > vorher {
            metriken
                .pre_handshake_dropped_total
                .inc_by(stats.vor_handshake_verworfen - vorher);
        }
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

/// Leitet Gateway-Events synchron an den Server weiter
struct EreignisBruecke {
    server: Weak<ServerInner>,
}

impl EreignisBruecke {
    fn server(&self) -> Option<Server> {
        self.server.upgrade().map(|inner| Server { inner })
    }
}

impl GatewayHandler for EreignisBruecke {
    fn verbindung_geoeffnet(
        &self,
        connection_id: ConnectionId,
        transport: TransportKind,
        peer: SocketAddr,
    ) {
        tracing::debug!(connection_id = %connection_id, peer = %peer, transport = %transport, "Verbindung offen");
        if let Some(server) = self.server() {
            server.verbindung_geoeffnet(connection_id, transport);
        }
    }

    fn handshake_abgeschlossen(&self, connection_id: ConnectionId, identity: &ParticipantId) {
        if let Some(server) = self.server() {
            server.sitzung_anlegen(connection_id, identity.clone());
        }
    }

    fn audio_frame(&self, frame: &AudioFrame) {
        if let Some(server) = self.server() {
            server.audio_weiterleiten(frame);
        }
    }

    fn verbindung_geschlossen(
        &self,
        connection_id: ConnectionId,
        identity: Option<&ParticipantId>,
        stats: &ConnectionStats,
    ) {
        if let Some(server) = self.server() {
            server.sitzung_beenden(connection_id, identity, stats);
        }
    }

    fn fehler(&self, connection_id: ConnectionId, detail: &str) {
        if let Some(server) = self.server() {
            server.gateway_fehler(connection_id, detail);
        }
    }
}

/// Standard-Konsument der Egress-Frames, wenn kein ASR angebunden ist
async fn downstream_schleife(
    mut rx: mpsc::Receiver<EgressFrame>,
    metriken: VoxbridgeMetrics,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    metriken.station_frames_sent_total.inc();
                    tracing::trace!(
                        station_id = %frame.station_id,
                        bytes = frame.pcm.len(),
                        "Egress-Frame"
                    );
                }
                None => break,
            },
            geaendert = shutdown_rx.changed() => {
                if geaendert.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
