//! WebSocket-Listener fuer den Message-Transport (axum)
//!
//! Pfadschema: `/<praefix>/<participantId>/<encoding>`. Die Identitaet
//! steht damit schon beim Upgrade fest; es gibt keinen Handshake-Frame.
//! Jede Binaernachricht enthaelt rohes Audio im Encoding des Pfads.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use voxbridge_core::{jetzt_ms, ParticipantId, TransportKind};
use voxbridge_protocol::Encoding;

use crate::connection::Ausgehend;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{Fortsetzung, ProtocolGateway};

// ---------------------------------------------------------------------------
// Pfad
// ---------------------------------------------------------------------------

/// Aus dem Request-Pfad abgeleitetes Ziel einer WebSocket-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketZiel {
    pub participant: ParticipantId,
    pub encoding: Encoding,
}

/// Loest `/<praefix>/<participantId>/<encoding>` auf
///
/// Fehlt die Teilnehmer-ID, wird `participant_<unix-ms>` vergeben.
/// Fehlt das Encoding, gilt `slin16`.
pub fn pfad_aufloesen(pfad: &str, praefix: &str) -> GatewayResult<WebSocketZiel> {
    let mut segmente = pfad.split('/').filter(|s| !s.is_empty());

    if segmente.next() != Some(praefix) {
        return Err(GatewayError::UngueltigerPfad(pfad.to_string()));
    }

    let participant = match segmente.next() {
        Some(id) => ParticipantId::from(id),
        None => ParticipantId::new(format!("participant_{}", jetzt_ms())),
    };

    let encoding = match segmente.next() {
        Some(name) => Encoding::aus_pfadsegment(name)
            .ok_or_else(|| GatewayError::UnbekanntesEncoding(name.to_string()))?,
        None => Encoding::Slin16,
    };

    Ok(WebSocketZiel {
        participant,
        encoding,
    })
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

pub(crate) async fn lauschen(
    gateway: ProtocolGateway,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let app = Router::new().fallback(upgrade).with_state(gateway);

    let ergebnis = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    })
    .await;

    match ergebnis {
        Ok(()) => tracing::info!("WebSocket-Listener gestoppt"),
        Err(e) => tracing::error!(fehler = %e, "WebSocket-Listener abgebrochen"),
    }
}

async fn upgrade(
    State(gateway): State<ProtocolGateway>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let ziel = match pfad_aufloesen(uri.path(), &gateway.config().websocket_praefix) {
        Ok(ziel) => ziel,
        Err(e) => {
            tracing::warn!(peer = %peer, pfad = %uri.path(), fehler = %e, "WebSocket-Upgrade abgelehnt");
            let status = match e {
                GatewayError::UngueltigerPfad(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            return (status, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| verbindung_bedienen(gateway, socket, peer, ziel))
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

async fn verbindung_bedienen(
    gateway: ProtocolGateway,
    socket: WebSocket,
    peer: SocketAddr,
    ziel: WebSocketZiel,
) {
    let (mut sender, mut empfaenger) = socket.split();
    let (tx, mut rx) = mpsc::channel(gateway.config().sende_queue_kapazitaet.max(1));
    let id = gateway.verbindung_registrieren(
        TransportKind::Message,
        peer,
        tx,
        Some(ziel.participant),
        ziel.encoding,
    );

    let schreiber = tokio::spawn(async move {
        while let Some(nachricht) = rx.recv().await {
            match nachricht {
                Ausgehend::Audio(daten) => {
                    if let Err(e) = sender.send(Message::Binary(daten.to_vec())).await {
                        tracing::warn!(connection_id = %id, fehler = %e, "Senden fehlgeschlagen");
                        return;
                    }
                }
                Ausgehend::Schliessen => break,
            }
        }
        let _ = sender.send(Message::Close(None)).await;
        let _ = sender.close().await;
    });

    let mut shutdown_rx = gateway.shutdown_empfaenger();
    while !*shutdown_rx.borrow() {
        tokio::select! {
            nachricht = empfaenger.next() => match nachricht {
                Some(Ok(Message::Binary(daten))) => {
                    if gateway.nachricht_verarbeiten(id, &daten) == Fortsetzung::Schliessen {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(connection_id = %id, "WebSocket geschlossen");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(connection_id = %id, laenge = text.len(), "Textnachricht ignoriert");
                }
                // Ping/Pong beantwortet axum selbst
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    gateway.transportfehler(id, e.to_string());
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    gateway.verbindung_trennen(id);
    if let Err(e) = schreiber.await {
        tracing::warn!(connection_id = %id, fehler = %e, "Schreib-Task abgebrochen");
    }
}
