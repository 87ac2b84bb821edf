//! TCP-Listener fuer den AudioSocket-Transport
//!
//! Pro Verbindung laufen zwei Tasks: der Lese-Task reicht jede Lieferung
//! an den Gateway weiter, der Schreib-Task rahmt ausgehendes PCM ueber
//! den `AudioSocketCodec`.

use futures_util::SinkExt;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedWrite;
use voxbridge_core::{ConnectionId, TransportKind};
use voxbridge_protocol::{AudioSocketCodec, AudioSocketFrame, Encoding};

use crate::connection::Ausgehend;
use crate::gateway::{Fortsetzung, ProtocolGateway};

/// Groesse des Lesepuffers pro Socket-Read
const LESEPUFFER: usize = 8192;

/// Accept-Loop; laeuft bis das Shutdown-Signal gesetzt wird
pub(crate) async fn lauschen(
    gateway: ProtocolGateway,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "TCP-Verbindung akzeptiert");
                        tokio::spawn(verbindung_bedienen(
                            gateway.clone(),
                            stream,
                            peer,
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("AudioSocket-Listener: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }
    tracing::info!("AudioSocket-Listener gestoppt");
}

async fn verbindung_bedienen(
    gateway: ProtocolGateway,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
    }
    let (mut lesen, schreiben) = stream.into_split();
    let (tx, rx) = mpsc::channel(gateway.config().sende_queue_kapazitaet.max(1));
    let id = gateway.verbindung_registrieren(TransportKind::Stream, peer, tx, None, Encoding::Slin16);
    let schreiber = tokio::spawn(schreiben_schleife(schreiben, rx, id));

    let mut puffer = vec![0u8; LESEPUFFER];
    while !*shutdown_rx.borrow() {
        tokio::select! {
            ergebnis = lesen.read(&mut puffer) => match ergebnis {
                Ok(0) => {
                    tracing::debug!(connection_id = %id, "EOF");
                    break;
                }
                Ok(n) => {
                    if gateway.stream_daten_verarbeiten(id, &puffer[..n]) == Fortsetzung::Schliessen {
                        break;
                    }
                }
                Err(e) => {
                    gateway.transportfehler(id, e.to_string());
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    // Entfernen aus der Tabelle schliesst die Sende-Queue
    gateway.verbindung_trennen(id);
    if let Err(e) = schreiber.await {
        tracing::warn!(connection_id = %id, fehler = %e, "Schreib-Task abgebrochen");
    }
}

async fn schreiben_schleife(
    schreiben: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Ausgehend>,
    id: ConnectionId,
) {
    let mut framed = FramedWrite::new(schreiben, AudioSocketCodec::new());
    while let Some(nachricht) = rx.recv().await {
        match nachricht {
            Ausgehend::Audio(pcm) => {
                if let Err(e) = framed.send(AudioSocketFrame::Audio(pcm)).await {
                    tracing::warn!(connection_id = %id, fehler = %e, "Senden fehlgeschlagen");
                    break;
                }
            }
            Ausgehend::Schliessen => break,
        }
    }
    if let Err(e) = framed.get_mut().shutdown().await {
        tracing::debug!(connection_id = %id, fehler = %e, "Shutdown der Schreibseite");
    }
}
