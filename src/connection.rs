//! ConnectionActor (C5): one accepted WebSocket, split into a read loop
//! running on the caller's task and a dedicated outbound writer task owning
//! the sink half exclusively — the single-writer-task pattern the corpus
//! uses for ordered outbound delivery (the other_examples S2S link's
//! `write_tx`/`write_rx` split, the teacher's gossip drain in `network.rs`).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::auth::extract_identity;
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::registry::NetworkRegistry;
use crate::router;

pub async fn handle_socket(
    socket: WebSocket,
    registry: Arc<NetworkRegistry>,
    client_id_header: Option<String>,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Envelope>(registry.config().write_buffer_frames);
    let ping_interval = registry.config().ping_interval;

    // The writer task owns the sink exclusively, so the `Ping` keepalive
    // (spec §4.4: "issue a Ping every pingInterval") is also sent from here
    // rather than threaded back through the envelope queue.
    let writer = tokio::spawn(async move {
        let mut keepalive_tick = interval(ping_interval);
        keepalive_tick.tick().await;
        loop {
            tokio::select! {
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    if sink.send(Message::Text(envelope.to_json())).await.is_err() {
                        break;
                    }
                }
                _ = keepalive_tick.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    let mut identity: Option<ed25519_dalek::VerifyingKey> = None;
    let mut connection_id: Option<u64> = None;
    let mut last_seen = Instant::now();
    let mut idle_check_tick = interval(registry.config().ping_interval);

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else { break };
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                };
                last_seen = Instant::now();
                match frame {
                    Message::Text(raw) => {
                        if let Err(close) = process_text_frame(
                            &raw,
                            &registry,
                            &tx,
                            client_id_header.as_deref(),
                            &mut identity,
                            &mut connection_id,
                        )
                        .await
                        {
                            warn!(error = %close, "closing connection after protocol error");
                            break;
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break,
                    Message::Binary(_) => {
                        let _ = tx.try_send(Envelope::error(
                            "unknown",
                            &HubError::Protocol("binary frames are not supported".into()),
                        ));
                    }
                }
            }
            _ = idle_check_tick.tick() => {
                if last_seen.elapsed() > registry.config().idle_timeout {
                    info!("closing idle connection");
                    break;
                }
            }
        }
    }

    if let (Some(cid), Some(key)) = (connection_id, identity) {
        let key_hex = hex::encode(key.to_bytes());
        registry.handle_connection_closed(cid, &key_hex).await;
    }
    writer.abort();
}

async fn process_text_frame(
    raw: &str,
    registry: &Arc<NetworkRegistry>,
    tx: &mpsc::Sender<Envelope>,
    client_id_header: Option<&str>,
    identity: &mut Option<ed25519_dalek::VerifyingKey>,
    connection_id: &mut Option<u64>,
) -> Result<(), HubError> {
    let envelope = Envelope::decode(raw)?;

    if identity.is_none() {
        let key = extract_identity(client_id_header, Some(&envelope.payload))
            .map_err(HubError::from)?;
        let cid = registry
            .register_connection(&hex::encode(key.to_bytes()), tx.clone())
            .await;
        *identity = Some(key);
        *connection_id = Some(cid);
        debug!(connection_id = cid, "connection identified");
    }

    let key = identity.expect("identity set above");
    let key_hex = hex::encode(key.to_bytes());
    let cid = connection_id.expect("connection_id set above");

    let response = router::dispatch(registry, &key_hex, cid, &envelope).await;
    match response {
        Ok(Some(reply)) => {
            let _ = tx.try_send(reply);
        }
        Ok(None) => {}
        Err(e) => {
            let _ = tx.try_send(Envelope::error(&envelope.message_id, &e));
        }
    }
    Ok(())
}
