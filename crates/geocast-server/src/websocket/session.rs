//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use geocast_core::ConnectionId;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::broadcast::TopicBroker;
use super::connection::ClientConnection;
use super::handler::{FrameAction, FrameContext, handle_message};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::realtime::Dispatcher;
use crate::shutdown::ShutdownCoordinator;

/// How long cleanup waits for queued frames to flush.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared handles a session needs.
#[derive(Clone)]
pub struct SessionDeps {
    /// Event dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Topic broker.
    pub broker: Arc<TopicBroker>,
    /// Server-wide shutdown.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Timeouts and buffer sizes.
    pub config: Arc<ServerConfig>,
}

/// Run one WebSocket session.
///
/// Inbound text (or UTF-8 binary) messages are decoded as STOMP frames and
/// handled in order. Outbound frames flow through a bounded queue drained by
/// a writer task, which also sends periodic pings and drops the connection
/// after `pong_timeout` of silence.
#[instrument(skip_all, fields(conn_id = %connection_id))]
pub async fn run_ws_session(ws: WebSocket, connection_id: ConnectionId, deps: SessionDeps) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(deps.config.outbound_buffer);
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    deps.broker.add(connection.clone()).await;

    let closing = deps.shutdown.child_token();

    let writer_conn = connection.clone();
    let writer_closing = closing.clone();
    let ping_every = deps.config.effective_ping_interval();
    let pong_timeout = deps.config.pong_timeout;
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_conn.check_alive() && writer_conn.last_pong_elapsed() > pong_timeout {
                        warn!(timeout = ?pong_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_closing.cancelled() => {
                    while let Ok(text) = send_rx.try_recv() {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_closing.cancel();
    });

    let ctx = FrameContext {
        dispatcher: &deps.dispatcher,
        broker: &deps.broker,
    };

    loop {
        let msg = tokio::select! {
            () = closing.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let Some(Ok(msg)) = msg else { break };

        let action = match msg {
            Message::Text(text) => {
                connection.mark_alive();
                handle_message(text.as_bytes(), &connection, &ctx).await
            }
            Message::Binary(data) => {
                connection.mark_alive();
                if std::str::from_utf8(&data).is_ok() {
                    handle_message(&data, &connection, &ctx).await
                } else {
                    info!(len = data.len(), "ignoring non-UTF8 binary message");
                    FrameAction::Continue
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                FrameAction::Continue
            }
        };
        if action == FrameAction::Close {
            break;
        }
    }

    deps.broker.remove(&connection.id).await;
    closing.cancel();
    let abort = writer.abort_handle();
    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        debug!("writer did not finish flushing in time");
        abort.abort();
    }

    let lifetime = connection.connected_at.elapsed();
    info!(
        lifetime_secs = lifetime.as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(lifetime.as_secs_f64());
}

