//! Connection – Zustand einer einzelnen Netzwerkverbindung
//!
//! Jede Verbindung besitzt einen eigenen Akkumulator. Eingehende Bytes
//! werden angehaengt und daraus so viele vollstaendige Frames wie moeglich
//! extrahiert; ein unvollstaendiger Rest bleibt bis zur naechsten
//! Lieferung liegen.
//!
//! ## State Machine
//! ```text
//! Stream:  Connecting -> Handshaking -> Streaming -> Closing -> Closed
//! Message: Connecting ----------------> Streaming -> Closing -> Closed
//! ```

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use voxbridge_core::{jetzt_ms, ConnectionId, ParticipantId, TransportKind};
use voxbridge_protocol::wire::MAX_PAYLOAD_SIZE;
use voxbridge_protocol::{AudioFormat, AudioSocketCodec, AudioSocketFrame, Encoding, ProtocolError};

use crate::error::{GatewayError, GatewayResult};
use crate::events::{AudioFrame, ConnectionStats, GatewayEvent, VerbindungsSnapshot};

/// Die ersten Frames einer Verbindung werden einzeln geloggt
const FRUEHE_FRAMES_LOGGEN: u64 = 5;
/// Fortschritts-Log alle N Audio-Frames
const FORTSCHRITT_INTERVALL: u64 = 50;

// ---------------------------------------------------------------------------
// Zustand
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Wartet auf den UUID-Frame (nur Stream-Transport)
    Handshaking,
    Streaming,
    Closing,
    Closed,
}

/// Nachricht an den Schreib-Task einer Verbindung
#[derive(Debug)]
pub(crate) enum Ausgehend {
    /// PCM-Payload, bereits im Encoding der Verbindung
    Audio(Bytes),
    Schliessen,
}

/// Ergebnis einer Verarbeitung eingehender Bytes
#[derive(Debug, Default)]
pub(crate) struct Verarbeitung {
    pub events: Vec<GatewayEvent>,
    pub audio_frames: u64,
    pub fehler: u64,
    pub vor_handshake_verworfen: u64,
    /// HANGUP empfangen – Verbindung abbauen
    pub schliessen: bool,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub(crate) struct Connection {
    pub id: ConnectionId,
    pub transport: TransportKind,
    pub zustand: ConnectionState,
    pub identity: Option<ParticipantId>,
    pub peer: SocketAddr,
    pub encoding: Encoding,
    akkumulator: BytesMut,
    naechste_sequenz: u64,
    erstellt: Instant,
    pub frames_gesamt: u64,
    pub audio_frames: u64,
    pub bytes_gesamt: u64,
    pub fehler: u64,
    pub vor_handshake_verworfen: u64,
    pub letzte_aktivitaet_ms: u64,
    pub ausgang: mpsc::Sender<Ausgehend>,
}

impl Connection {
    pub fn neu(
        transport: TransportKind,
        peer: SocketAddr,
        ausgang: mpsc::Sender<Ausgehend>,
        encoding: Encoding,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            transport,
            zustand: ConnectionState::Connecting,
            identity: None,
            peer,
            encoding,
            akkumulator: BytesMut::with_capacity(4096),
            naechste_sequenz: 1,
            erstellt: Instant::now(),
            frames_gesamt: 0,
            audio_frames: 0,
            bytes_gesamt: 0,
            fehler: 0,
            vor_handshake_verworfen: 0,
            letzte_aktivitaet_ms: jetzt_ms(),
            ausgang,
        }
    }

    /// Identitaet ausserhalb des Protokolls setzen (Message-Transport)
    pub fn identitaet_vorgeben(&mut self, identity: ParticipantId) {
        self.identity = Some(identity);
        self.zustand = ConnectionState::Streaming;
    }

    // -----------------------------------------------------------------------
    // Stream-Transport (AudioSocket)
    // -----------------------------------------------------------------------

    /// Haengt eine Lieferung an den Akkumulator und verarbeitet alle
    /// darin vollstaendig enthaltenen Frames
    pub fn stream_daten(&mut self, daten: &[u8], format: &AudioFormat) -> Verarbeitung {
        let mut ergebnis = Verarbeitung::default();
        self.bytes_gesamt += daten.len() as u64;
        self.letzte_aktivitaet_ms = jetzt_ms();
        self.akkumulator.extend_from_slice(daten);

        while let Some(frame) = AudioSocketCodec::naechster_frame(&mut self.akkumulator) {
            self.frames_gesamt += 1;
            if self.frames_gesamt <= FRUEHE_FRAMES_LOGGEN {
                tracing::debug!(
                    connection_id = %self.id,
                    nr = self.frames_gesamt,
                    typ = ?frame.frame_type(),
                    laenge = frame.payload_laenge(),
                    "Frame empfangen"
                );
            }

            match frame {
                AudioSocketFrame::Hangup => {
                    tracing::info!(connection_id = %self.id, "HANGUP empfangen");
                    self.zustand = ConnectionState::Closing;
                    ergebnis.schliessen = true;
                    // Nachfolgende Bytes werden nicht mehr verarbeitet
                    break;
                }
                AudioSocketFrame::Uuid(text) => self.handshake(text, &mut ergebnis),
                AudioSocketFrame::Audio(pcm) => self.audio_ausgeben(pcm, format, &mut ergebnis),
                AudioSocketFrame::Error(text) => {
                    self.fehler_melden(format!("Gegenseite meldet Fehler: {text}"), &mut ergebnis);
                }
                AudioSocketFrame::Unbekannt { typ, payload } => {
                    self.fehler_melden(
                        format!("Unbekannter Frame-Typ 0x{typ:02X} ({} Bytes)", payload.len()),
                        &mut ergebnis,
                    );
                }
            }
        }

        ergebnis
    }

    fn handshake(&mut self, text: String, ergebnis: &mut Verarbeitung) {
        if self.zustand != ConnectionState::Handshaking {
            self.fehler_melden(
                format!("UUID-Frame im Zustand {:?} ignoriert", self.zustand),
                ergebnis,
            );
            return;
        }
        if text.is_empty() {
            self.fehler_melden("Leerer UUID-Frame".to_string(), ergebnis);
            return;
        }

        let identity = ParticipantId::new(text);
        tracing::info!(connection_id = %self.id, identity = %identity, "Handshake abgeschlossen");
        self.identity = Some(identity.clone());
        self.zustand = ConnectionState::Streaming;
        ergebnis.events.push(GatewayEvent::HandshakeComplete {
            connection_id: self.id,
            identity,
        });
    }

    // -----------------------------------------------------------------------
    // Message-Transport (rohes PCM)
    // -----------------------------------------------------------------------

    /// Haengt eine Binaernachricht an den Rolling-Buffer und schneidet
    /// daraus Frames fester Groesse
    pub fn nachricht(&mut self, daten: &[u8], format: &AudioFormat) -> Verarbeitung {
        let mut ergebnis = Verarbeitung::default();
        self.frames_gesamt += 1;
        self.bytes_gesamt += daten.len() as u64;
        self.letzte_aktivitaet_ms = jetzt_ms();

        match self.encoding.companding() {
            Some(companding) => self
                .akkumulator
                .extend_from_slice(&companding.expandieren(daten)),
            None => self.akkumulator.extend_from_slice(daten),
        }

        let groesse = format.frame_size_bytes;
        if groesse == 0 {
            return ergebnis;
        }
        while self.akkumulator.len() >= groesse {
            let pcm = self.akkumulator.split_to(groesse).freeze();
            self.audio_ausgeben(pcm, format, &mut ergebnis);
        }

        ergebnis
    }

    // -----------------------------------------------------------------------
    // Gemeinsam
    // -----------------------------------------------------------------------

    fn audio_ausgeben(&mut self, pcm: Bytes, format: &AudioFormat, ergebnis: &mut Verarbeitung) {
        let Some(identity) = self.identity.clone() else {
            self.vor_handshake_verworfen += 1;
            ergebnis.vor_handshake_verworfen += 1;
            tracing::warn!(
                connection_id = %self.id,
                verworfen = self.vor_handshake_verworfen,
                "Audio vor Handshake verworfen"
            );
            return;
        };

        let sequence_number = self.naechste_sequenz;
        self.naechste_sequenz += 1;
        self.audio_frames += 1;
        ergebnis.audio_frames += 1;

        if self.audio_frames % FORTSCHRITT_INTERVALL == 0 {
            tracing::debug!(
                connection_id = %self.id,
                identity = %identity,
                audio_frames = self.audio_frames,
                fps = self.frames_pro_sekunde(),
                kb = self.bytes_gesamt / 1024,
                "Audio-Fortschritt"
            );
        }

        tracing::trace!(connection_id = %self.id, seq = sequence_number, bytes = pcm.len(), "Audio-Frame");
        ergebnis.events.push(GatewayEvent::AudioFrame(AudioFrame {
            connection_id: self.id,
            identity,
            transport: self.transport,
            byte_length: pcm.len(),
            pcm,
            timestamp_ms: jetzt_ms(),
            sequence_number,
            sample_rate: format.sample_rate,
            duration_ms: format.frame_dauer_ms(),
        }));
    }

    fn fehler_melden(&mut self, detail: String, ergebnis: &mut Verarbeitung) {
        self.fehler += 1;
        ergebnis.fehler += 1;
        tracing::warn!(connection_id = %self.id, fehler = self.fehler, "{detail}");
        ergebnis.events.push(GatewayEvent::Error {
            connection_id: self.id,
            detail,
        });
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Bringt PCM16 in das Encoding der Verbindung
    ///
    /// Der Stream-Transport wird erst im Schreib-Task gerahmt; hier wird
    /// nur das 16-Bit-Laengenlimit geprueft.
    pub fn audio_verpacken(&self, pcm: &[u8]) -> GatewayResult<Bytes> {
        match self.transport {
            TransportKind::Stream => {
                if pcm.len() > MAX_PAYLOAD_SIZE {
                    return Err(GatewayError::Protokoll(ProtocolError::PayloadZuGross {
                        laenge: pcm.len(),
                    }));
                }
                Ok(Bytes::copy_from_slice(pcm))
            }
            TransportKind::Message => Ok(match self.encoding.companding() {
                Some(companding) => Bytes::from(companding.komprimieren(pcm)),
                None => Bytes::copy_from_slice(pcm),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Statistik
    // -----------------------------------------------------------------------

    pub fn frames_pro_sekunde(&self) -> f64 {
        let sekunden = self.erstellt.elapsed().as_secs_f64();
        if sekunden > 0.0 {
            self.audio_frames as f64 / sekunden
        } else {
            0.0
        }
    }

    pub fn abschluss_statistik(&self) -> ConnectionStats {
        ConnectionStats {
            dauer_ms: self.erstellt.elapsed().as_millis() as u64,
            frames_gesamt: self.frames_gesamt,
            audio_frames: self.audio_frames,
            bytes_gesamt: self.bytes_gesamt,
            frames_pro_sekunde: self.frames_pro_sekunde(),
            fehler: self.fehler,
        }
    }

    pub fn snapshot(&self) -> VerbindungsSnapshot {
        VerbindungsSnapshot {
            connection_id: self.id,
            transport: self.transport,
            identity: self.identity.clone(),
            peer: self.peer,
            frames_gesamt: self.frames_gesamt,
            audio_frames: self.audio_frames,
            bytes_gesamt: self.bytes_gesamt,
            uptime_ms: self.erstellt.elapsed().as_millis() as u64,
            frames_pro_sekunde: self.frames_pro_sekunde(),
        }
    }

    /// Bytes im Akkumulator, die noch keinen vollstaendigen Frame bilden
    pub fn ausstehende_bytes(&self) -> usize {
        self.akkumulator.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
