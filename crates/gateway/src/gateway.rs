//! ProtocolGateway – Verbindungstabelle, Event-Fan-Out und Send-Pfad
//!
//! Der Gateway besitzt die Verbindungstabelle exklusiv. Die Transport-Tasks
//! (TCP, WebSocket) reichen empfangene Bytes ueber die synchronen Methoden
//! `stream_daten_verarbeiten` / `nachricht_verarbeiten` herein. Events
//! gehen zuerst synchron an registrierte Handler, danach an alle
//! Abonnenten des Broadcast-Kanals.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use voxbridge_core::{ConnectionId, ParticipantId, TransportKind};
use voxbridge_protocol::{AudioFormat, Encoding};

use crate::config::GatewayConfig;
use crate::connection::{Ausgehend, Connection, ConnectionState, Verarbeitung};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{
    ConnectionStats, GatewayEvent, GatewayHandler, GatewayStatistik, VerbindungsSnapshot,
};
use crate::{tcp, websocket};

/// Soll die Verbindung nach einer Verarbeitung weiterlaufen?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fortsetzung {
    Weiter,
    Schliessen,
}

#[derive(Default)]
struct Zaehler {
    verbindungen_gesamt: AtomicU64,
    audio_frames: AtomicU64,
    bytes: AtomicU64,
    fehler: AtomicU64,
    vor_handshake_verworfen: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy)]
struct LauschAdressen {
    tcp: Option<SocketAddr>,
    websocket: Option<SocketAddr>,
}

struct GatewayInner {
    config: GatewayConfig,
    format: AudioFormat,
    verbindungen: DashMap<ConnectionId, Connection>,
    events: broadcast::Sender<GatewayEvent>,
    handler: RwLock<Vec<Arc<dyn GatewayHandler>>>,
    zaehler: Zaehler,
    shutdown_tx: watch::Sender<bool>,
    gestoppt: AtomicBool,
    lauscher: Mutex<Vec<JoinHandle<()>>>,
    adressen: Mutex<LauschAdressen>,
}

/// Zentraler Eingang fuer beide Transporte
///
/// Klonbar; alle Klone teilen sich denselben Zustand.
#[derive(Clone)]
pub struct ProtocolGateway {
    inner: Arc<GatewayInner>,
}

impl ProtocolGateway {
    pub fn neu(config: GatewayConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_kapazitaet.max(16));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(GatewayInner {
                format: config.audio_format(),
                config,
                verbindungen: DashMap::new(),
                events,
                handler: RwLock::new(Vec::new()),
                zaehler: Zaehler::default(),
                shutdown_tx,
                gestoppt: AtomicBool::new(false),
                lauscher: Mutex::new(Vec::new()),
                adressen: Mutex::new(LauschAdressen::default()),
            }),
        }
    }

    /// Neuer Empfaenger fuer alle Gateway-Events
    pub fn abonnieren(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// Registriert einen verlustfreien Handler
    ///
    /// Muss vor `starten()` erfolgen, damit keine Verbindung ohne Handler
    /// geoeffnet wird.
    pub fn handler_registrieren(&self, handler: Arc<dyn GatewayHandler>) {
        self.inner.handler.write().push(handler);
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    pub fn tcp_adresse(&self) -> Option<SocketAddr> {
        self.inner.adressen.lock().tcp
    }

    pub fn websocket_adresse(&self) -> Option<SocketAddr> {
        self.inner.adressen.lock().websocket
    }

    pub(crate) fn shutdown_empfaenger(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Listener
    // -----------------------------------------------------------------------

    /// Bindet beide Listener und startet die Accept-Loops
    pub async fn starten(&self) -> GatewayResult<()> {
        if self.inner.gestoppt.load(Ordering::SeqCst) {
            return Err(GatewayError::Gestoppt);
        }

        let tcp_listener = TcpListener::bind(self.inner.config.tcp_bind()).await?;
        let ws_listener = TcpListener::bind(self.inner.config.websocket_bind()).await?;
        let adressen = LauschAdressen {
            tcp: Some(tcp_listener.local_addr()?),
            websocket: Some(ws_listener.local_addr()?),
        };
        *self.inner.adressen.lock() = adressen;

        let tcp_task = tokio::spawn(tcp::lauschen(
            self.clone(),
            tcp_listener,
            self.shutdown_empfaenger(),
        ));
        let ws_task = tokio::spawn(websocket::lauschen(
            self.clone(),
            ws_listener,
            self.shutdown_empfaenger(),
        ));
        self.inner.lauscher.lock().extend([tcp_task, ws_task]);

        tracing::info!(
            tcp = ?adressen.tcp,
            websocket = ?adressen.websocket,
            sample_rate = self.inner.format.sample_rate,
            frame_size = self.inner.format.frame_size_bytes,
            "ProtocolGateway gestartet"
        );
        Ok(())
    }

    /// Schliesst alle Verbindungen und beendet beide Listener (idempotent)
    pub async fn stoppen(&self) {
        if self.inner.gestoppt.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            verbindungen = self.inner.verbindungen.len(),
            "ProtocolGateway wird gestoppt"
        );
        self.inner.shutdown_tx.send_replace(true);

        let ids: Vec<ConnectionId> = self.inner.verbindungen.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some(v) = self.inner.verbindungen.get(&id) {
                let _ = v.ausgang.try_send(Ausgehend::Schliessen);
            }
            self.verbindung_trennen(id);
        }

        let lauscher: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.lauscher.lock());
        for handle in lauscher {
            if let Err(e) = handle.await {
                tracing::warn!(fehler = %e, "Listener-Task nicht sauber beendet");
            }
        }
        tracing::info!("ProtocolGateway gestoppt");
    }

    // -----------------------------------------------------------------------
    // Verbindungstabelle
    // -----------------------------------------------------------------------

    /// Nimmt eine neue Verbindung in die Tabelle auf
    ///
    /// Mit `participant` (Message-Transport) ist der Handshake sofort
    /// abgeschlossen, sonst wartet die Verbindung auf den UUID-Frame.
    pub(crate) fn verbindung_registrieren(
        &self,
        transport: TransportKind,
        peer: SocketAddr,
        ausgang: mpsc::Sender<Ausgehend>,
        participant: Option<ParticipantId>,
        encoding: Encoding,
    ) -> ConnectionId {
        let mut verbindung = Connection::neu(transport, peer, ausgang, encoding);
        let id = verbindung.id;
        match &participant {
            Some(p) => verbindung.identitaet_vorgeben(p.clone()),
            None => verbindung.zustand = ConnectionState::Handshaking,
        }
        self.inner.verbindungen.insert(id, verbindung);
        self.inner.zaehler.verbindungen_gesamt.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            connection_id = %id,
            transport = %transport,
            peer = %peer,
            participant = participant.as_ref().map(|p| p.as_str()),
            "Verbindung geoeffnet"
        );

        self.senden(GatewayEvent::ConnectionOpened {
            connection_id: id,
            transport,
            peer,
            participant: participant.clone(),
        });
        if let Some(identity) = participant {
            self.senden(GatewayEvent::HandshakeComplete {
                connection_id: id,
                identity,
            });
        }
        id
    }

    /// Entfernt eine Verbindung und meldet ihre Abschluss-Statistik
    ///
    /// Gibt `None` zurueck, wenn die Verbindung bereits entfernt wurde.
    pub fn verbindung_trennen(&self, id: ConnectionId) -> Option<ConnectionStats> {
        let (_, mut verbindung) = self.inner.verbindungen.remove(&id)?;
        verbindung.zustand = ConnectionState::Closed;
        let stats = verbindung.abschluss_statistik();

        tracing::info!(
            connection_id = %id,
            identity = verbindung.identity.as_ref().map(|i| i.as_str()),
            dauer_ms = stats.dauer_ms,
            frames = stats.frames_gesamt,
            audio_frames = stats.audio_frames,
            bytes = stats.bytes_gesamt,
            fps = stats.frames_pro_sekunde,
            "Verbindung geschlossen"
        );

        self.senden(GatewayEvent::ConnectionClosed {
            connection_id: id,
            identity: verbindung.identity.clone(),
            transport: verbindung.transport,
            stats: stats.clone(),
        });
        Some(stats)
    }

    /// Socket-Fehler: zaehlen, melden; der Transport-Task baut danach ab
    pub(crate) fn transportfehler(&self, id: ConnectionId, detail: String) {
        self.inner.zaehler.fehler.fetch_add(1, Ordering::Relaxed);
        if let Some(mut v) = self.inner.verbindungen.get_mut(&id) {
            v.fehler += 1;
            v.zustand = ConnectionState::Closing;
        }
        tracing::error!(connection_id = %id, fehler = %detail, "Transportfehler");
        self.senden(GatewayEvent::Error {
            connection_id: id,
            detail,
        });
    }

    // -----------------------------------------------------------------------
    // Eingang
    // -----------------------------------------------------------------------

    /// Verarbeitet eine Lieferung des Stream-Transports (AudioSocket)
    pub fn stream_daten_verarbeiten(&self, id: ConnectionId, daten: &[u8]) -> Fortsetzung {
        self.inner.zaehler.bytes.fetch_add(daten.len() as u64, Ordering::Relaxed);
        let ergebnis = match self.inner.verbindungen.get_mut(&id) {
            Some(mut v) => v.stream_daten(daten, &self.inner.format),
            None => {
                tracing::warn!(connection_id = %id, "Daten fuer unbekannte Verbindung");
                return Fortsetzung::Schliessen;
            }
        };
        self.ergebnis_anwenden(ergebnis)
    }

    /// Verarbeitet eine Binaernachricht des Message-Transports
    pub fn nachricht_verarbeiten(&self, id: ConnectionId, daten: &[u8]) -> Fortsetzung {
        self.inner.zaehler.bytes.fetch_add(daten.len() as u64, Ordering::Relaxed);
        let ergebnis = match self.inner.verbindungen.get_mut(&id) {
            Some(mut v) => v.nachricht(daten, &self.inner.format),
            None => {
                tracing::warn!(connection_id = %id, "Nachricht fuer unbekannte Verbindung");
                return Fortsetzung::Schliessen;
            }
        };
        self.ergebnis_anwenden(ergebnis)
    }

    fn ergebnis_anwenden(&self, ergebnis: Verarbeitung) -> Fortsetzung {
        let z = &self.inner.zaehler;
        z.audio_frames.fetch_add(ergebnis.audio_frames, Ordering::Relaxed);
        z.fehler.fetch_add(ergebnis.fehler, Ordering::Relaxed);
        z.vor_handshake_verworfen
            .fetch_add(ergebnis.vor_handshake_verworfen, Ordering::Relaxed);

        for event in ergebnis.events {
            self.senden(event);
        }
        if ergebnis.schliessen {
            Fortsetzung::Schliessen
        } else {
            Fortsetzung::Weiter
        }
    }

    fn senden(&self, event: GatewayEvent) {
        // Kopie, damit Handler den Gateway ohne gehaltene Sperre aufrufen
        let handler = self.inner.handler.read().clone();
        for h in &handler {
            event.zustellen(h.as_ref());
        }
        // Ohne Abonnenten gehen Events verloren, das ist kein Fehler
        let _ = self.inner.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Ausgang
    // -----------------------------------------------------------------------

    /// Sendet PCM16 an eine Verbindung
    ///
    /// Blockiert nie: ist die Verbindung unbekannt, geschlossen oder ihre
    /// Sende-Queue voll, wird `false` zurueckgegeben.
    pub fn send_audio(&self, id: ConnectionId, pcm: &[u8]) -> bool {
        let Some(verbindung) = self.inner.verbindungen.get(&id) else {
            tracing::warn!(connection_id = %id, "send_audio: unbekannte Verbindung");
            return false;
        };
        if matches!(
            verbindung.zustand,
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            tracing::warn!(connection_id = %id, "send_audio: Verbindung wird geschlossen");
            return false;
        }

        let daten = match verbindung.audio_verpacken(pcm) {
            Ok(daten) => daten,
            Err(e) => {
                tracing::warn!(connection_id = %id, fehler = %e, "send_audio abgelehnt");
                return false;
            }
        };

        match verbindung.ausgang.try_send(Ausgehend::Audio(daten)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "send_audio: Sende-Queue voll");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(connection_id = %id, "send_audio: Socket nicht beschreibbar");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statistik
    // -----------------------------------------------------------------------

    pub fn verbindungen_anzahl(&self) -> usize {
        self.inner.verbindungen.len()
    }

    /// Steht die Verbindung noch in der Tabelle?
    pub fn ist_verbunden(&self, id: ConnectionId) -> bool {
        self.inner.verbindungen.contains_key(&id)
    }

    /// Alle Verbindungen mit abgeschlossenem Handshake
    pub fn aktive_verbindungen(&self) -> Vec<VerbindungsSnapshot> {
        self.inner
            .verbindungen
            .iter()
            .filter(|v| v.zustand == ConnectionState::Streaming)
            .map(|v| v.snapshot())
            .collect()
    }

    pub fn statistik(&self) -> GatewayStatistik {
        let z = &self.inner.zaehler;
        GatewayStatistik {
            verbindungen_gesamt: z.verbindungen_gesamt.load(Ordering::Relaxed),
            verbindungen_aktiv: self.inner.verbindungen.len(),
            audio_frames_gesamt: z.audio_frames.load(Ordering::Relaxed),
            bytes_gesamt: z.bytes.load(Ordering::Relaxed),
            fehler: z.fehler.load(Ordering::Relaxed),
            vor_handshake_verworfen: z.vor_handshake_verworfen.load(Ordering::Relaxed),
            verbindungen: self.inner.verbindungen.iter().map(|v| v.snapshot()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_protocol::FrameType;

    fn gateway() -> ProtocolGateway {
        ProtocolGateway::neu(GatewayConfig::default())
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn frame(typ: u8, payload: &[u8]) -> Vec<u8> {
        let mut daten = vec![typ];
        daten.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        daten.extend_from_slice(payload);
        daten
    }

    fn stream_verbindung(gw: &ProtocolGateway) -> (ConnectionId, mpsc::Receiver<Ausgehend>) {
        let (tx, rx) = mpsc::channel(4);
        let id = gw.verbindung_registrieren(TransportKind::Stream, peer(), tx, None, Encoding::Slin16);
        (id, rx)
    }

    fn audio_events(rx: &mut broadcast::Receiver<GatewayEvent>) -> Vec<crate::AudioFrame> {
        let mut frames = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GatewayEvent::AudioFrame(f) = event {
                frames.push(f);
            }
        }
        frames
    }

    #[test]
    fn frames_ueber_mehrere_lieferungen() {
        let gw = gateway();
        let (id, _rx) = stream_verbindung(&gw);
        gw.stream_daten_verarbeiten(id, &frame(FrameType::UUID, b"abc"));
        let mut events = gw.abonnieren();

        let mut daten = Vec::new();
        for _ in 0..3 {
            daten.extend(frame(FrameType::AUDIO, &[7; 320]));
        }
        // 2.5 Frames in der ersten Lieferung
        let schnitt = 2 * 323 + 160;
        gw.stream_daten_verarbeiten(id, &daten[..schnitt]);
        assert_eq!(audio_events(&mut events).len(), 2);

        gw.stream_daten_verarbeiten(id, &daten[schnitt..]);
        let rest = audio_events(&mut events);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence_number, 3);
        assert_eq!(rest[0].byte_length, 320);
    }

    #[test]
    fn einzelne_bytes_ergeben_keinen_vorzeitigen_frame() {
        let gw = gateway();
        let (id, _rx) = stream_verbindung(&gw);
        gw.stream_daten_verarbeiten(id, &frame(FrameType::UUID, b"abc"));
        let mut events = gw.abonnieren();

        let daten = frame(FrameType::AUDIO, &[1; 320]);
        for (i, byte) in daten.iter().enumerate() {
            gw.stream_daten_verarbeiten(id, std::slice::from_ref(byte));
            let erwartet = usize::from(i == daten.len() - 1);
            assert_eq!(audio_events(&mut events).len(), erwartet);
        }
    }

    #[test]
    fn handshake_dann_drei_audio_frames() {
        let gw = gateway();
        let mut events = gw.abonnieren();
        let (id, _rx) = stream_verbindung(&gw);

        let mut daten = frame(FrameType::UUID, b"abc-123");
        for _ in 0..3 {
            daten.extend(frame(FrameType::AUDIO, &[0; 320]));
        }
        assert_eq!(gw.stream_daten_verarbeiten(id, &daten), Fortsetzung::Weiter);

        assert!(matches!(events.try_recv(), Ok(GatewayEvent::ConnectionOpened { .. })));
        match events.try_recv() {
            Ok(GatewayEvent::HandshakeComplete { identity, .. }) => {
                assert_eq!(identity.as_str(), "abc-123")
            }
            anderes => panic!("HandshakeComplete erwartet, war {anderes:?}"),
        }
        let frames = audio_events(&mut events);
        let sequenzen: Vec<u64> = frames.iter().map(|f| f.sequence_number).collect();
        assert_eq!(sequenzen, vec![1, 2, 3]);
        assert!(frames.iter().all(|f| f.identity.as_str() == "abc-123"));
        assert!(frames.iter().all(|f| f.duration_ms == 20 && f.sample_rate == 8000));
    }

    #[test]
    fn statistik_zaehlt_verwerfungen_und_fehler() {
        let gw = gateway();
        let (id, _rx) = stream_verbindung(&gw);
        let mut daten = frame(FrameType::AUDIO, &[0; 320]);
        daten.extend(frame(0x7E, &[]));
        gw.stream_daten_verarbeiten(id, &daten);

        let s = gw.statistik();
        assert_eq!(s.vor_handshake_verworfen, 1);
        assert_eq!(s.fehler, 1);
        assert_eq!(s.verbindungen_aktiv, 1);
        assert!(gw.aktive_verbindungen().is_empty());
    }

    #[test]
    fn trennen_meldet_statistik() {
        let gw = gateway();
        let (id, _rx) = stream_verbindung(&gw);
        let mut daten = frame(FrameType::UUID, b"x");
        daten.extend(frame(FrameType::AUDIO, &[0; 320]));
        gw.stream_daten_verarbeiten(id, &daten);

        let mut events = gw.abonnieren();
        let stats = gw.verbindung_trennen(id).unwrap();
        assert_eq!(stats.audio_frames, 1);
        assert_eq!(stats.frames_gesamt, 2);
        assert_eq!(stats.bytes_gesamt, daten.len() as u64);
        assert!(matches!(events.try_recv(), Ok(GatewayEvent::ConnectionClosed { .. })));
        assert!(gw.verbindung_trennen(id).is_none());
        assert_eq!(gw.verbindungen_anzahl(), 0);
    }

    #[test]
    fn message_transport_handshake_sofort() {
        let gw = gateway();
        let mut events = gw.abonnieren();
        let (tx, _rx) = mpsc::channel(4);
        let id = gw.verbindung_registrieren(
            TransportKind::Message,
            peer(),
            tx,
            Some(ParticipantId::from("alice")),
            Encoding::Slin16,
        );
        assert!(matches!(
            events.try_recv(),
            Ok(GatewayEvent::ConnectionOpened { participant: Some(_), .. })
        ));
        assert!(matches!(events.try_recv(), Ok(GatewayEvent::HandshakeComplete { .. })));

        gw.nachricht_verarbeiten(id, &[0; 640]);
        assert_eq!(audio_events(&mut events).len(), 2);
        assert_eq!(gw.aktive_verbindungen().len(), 1);
    }

    #[test]
    fn send_audio_pfade() {
        let gw = gateway();
        let (id, mut rx) = stream_verbindung(&gw);

        assert!(gw.send_audio(id, &[1, 2, 3, 4]));
        assert!(matches!(rx.try_recv(), Ok(Ausgehend::Audio(d)) if d.len() == 4));

        // Ueber dem 16-Bit-Laengenlimit
        assert!(!gw.send_audio(id, &vec![0; 70_000]));
        assert!(!gw.send_audio(ConnectionId::new(), &[0; 4]));

        // Queue (Kapazitaet 4) volllaufen lassen
        for _ in 0..4 {
            assert!(gw.send_audio(id, &[0; 2]));
        }
        assert!(!gw.send_audio(id, &[0; 2]));
    }

    #[test]
    fn send_audio_nach_hangup_schlaegt_fehl() {
        let gw = gateway();
        let (id, _rx) = stream_verbindung(&gw);
        let mut daten = frame(FrameType::UUID, b"x");
        daten.extend(frame(FrameType::HANGUP, &[]));
        assert_eq!(gw.stream_daten_verarbeiten(id, &daten), Fortsetzung::Schliessen);
        assert!(!gw.send_audio(id, &[0; 4]));
    }

    #[derive(Default)]
    struct Protokoll {
        eintraege: Mutex<Vec<String>>,
    }

    impl GatewayHandler for Protokoll {
        fn verbindung_geoeffnet(&self, _: ConnectionId, transport: TransportKind, _: SocketAddr) {
            self.eintraege.lock().push(format!("offen:{transport}"));
        }
        fn handshake_abgeschlossen(&self, _: ConnectionId, identity: &ParticipantId) {
            self.eintraege.lock().push(format!("handshake:{identity}"));
        }
        fn audio_frame(&self, frame: &crate::AudioFrame) {
            self.eintraege.lock().push(format!("audio:{}", frame.sequence_number));
        }
        fn verbindung_geschlossen(
            &self,
            _: ConnectionId,
            _: Option<&ParticipantId>,
            stats: &ConnectionStats,
        ) {
            self.eintraege.lock().push(format!("zu:{}", stats.audio_frames));
        }
    }

    #[test]
    fn handler_verpasst_bei_rueckstau_nichts() {
        let gw = ProtocolGateway::neu(GatewayConfig {
            event_kapazitaet: 16,
            ..GatewayConfig::default()
        });
        let protokoll = Arc::new(Protokoll::default());
        gw.handler_registrieren(protokoll.clone());
        // Abonnent, der nie liest
        let mut langsam = gw.abonnieren();
        let (id, _rx) = stream_verbindung(&gw);

        let mut daten = frame(FrameType::UUID, b"abc");
        for _ in 0..40 {
            daten.extend(frame(FrameType::AUDIO, &[0; 320]));
        }
        gw.stream_daten_verarbeiten(id, &daten);
        gw.verbindung_trennen(id);

        let eintraege = protokoll.eintraege.lock().clone();
        assert_eq!(eintraege.len(), 43);
        assert_eq!(eintraege[0], "offen:stream");
        assert_eq!(eintraege[1], "handshake:abc");
        assert_eq!(eintraege[2], "audio:1");
        assert_eq!(eintraege[41], "audio:40");
        assert_eq!(eintraege[42], "zu:40");
        assert!(matches!(
            langsam.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert!(!gw.ist_verbunden(id));
    }

    #[tokio::test]
    async fn stoppen_ist_idempotent() {
        let gw = gateway();
        let (_id, mut rx) = stream_verbindung(&gw);
        gw.stoppen().await;
        gw.stoppen().await;
        assert_eq!(gw.verbindungen_anzahl(), 0);
        assert!(matches!(rx.recv().await, Some(Ausgehend::Schliessen)));
        assert!(matches!(gw.starten().await, Err(GatewayError::Gestoppt)));
    }
}
