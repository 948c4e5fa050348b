use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, Outbound};

/// Server-side liveness check for one session.
///
/// A Ping goes out every `interval`; after `max_missed` consecutive
/// intervals without a Pong the session is dropped. The default is 15s and
/// 2 missed (~30s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub max_missed: u8,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_missed: 2,
        }
    }
}

/// Drive one WebSocket session from upgrade to disconnect.
///
/// The session is registered unnamed, every inbound text frame goes through
/// [`Dispatcher::on_frame`], and everything the dispatcher queues for this
/// session is written back out. Cancelling `shutdown` closes the socket.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    heartbeat: Heartbeat,
) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut outbound_rx) = dispatcher.connect().await;
    info!("session {} connected", session_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Registry -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat.interval);
        ticker.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(Outbound::Text(text)) => {
                            if sender.send(Message::Text(Utf8Bytes::from(&*text))).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= heartbeat.max_missed {
                            warn!("session {} heartbeat timeout (missed {} pongs), dropping", session_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Socket -> registry
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    dispatcher_recv.on_frame(session_id, text.as_str()).await;
                }
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => dispatcher_recv.on_frame(session_id, text).await,
                    Err(_) => warn!(
                        "session {} sent {} bytes of non-UTF-8 binary, dropped",
                        session_id,
                        data.len()
                    ),
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if dispatcher.disconnect(session_id).await {
        info!("session {} disconnected", session_id);
    } else {
        debug!("session {} closed by shutdown", session_id);
    }
}
