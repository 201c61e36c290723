//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::WireEvent;
use relay_runtime::{RelayContext, SessionChannel, serve_session};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::connection::{ConnectionPermit, Liveness};

/// Inbound frames buffered between the socket reader and the Turn driver.
const INBOUND_CAPACITY: usize = 16;

/// How long to let the writer flush after the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-session knobs taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Accept further prompts after a terminal event.
    pub multi_turn: bool,
    /// Ping cadence.
    pub heartbeat_interval: Duration,
    /// Silence budget before the client is dropped.
    pub heartbeat_timeout: Duration,
}

/// Run one WebSocket session.
///
/// 1. Splits the socket into a writer task (outbound events + Ping frames)
///    and a reader task (inbound text/binary frames)
/// 2. Serves prompts through [`serve_session`] until the client leaves, the
///    session ends, or the server shuts down
/// 3. Flushes pending events, closes the socket, and releases the permit
#[instrument(skip_all, fields(connection_id = %permit.id()))]
pub async fn run_ws_session(
    socket: WebSocket,
    ctx: RelayContext,
    options: SessionOptions,
    permit: ConnectionPermit,
    shutdown: CancellationToken,
) {
    info!("client connected");
    let (ws_tx, ws_rx) = socket.split();
    let liveness = Arc::new(Liveness::new());

    let (out_tx, out_rx) = mpsc::channel::<WireEvent>(ctx.channel_capacity);
    let (in_tx, in_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);

    let mut writer = tokio::spawn(write_loop(ws_tx, out_rx, Arc::clone(&liveness), options));
    let reader = tokio::spawn(read_loop(ws_rx, in_tx, Arc::clone(&liveness)));

    let mut channel = SessionChannel::duplex(out_tx, in_rx);
    let writer_finished = tokio::select! {
        summary = serve_session(&ctx, &mut channel, options.multi_turn) => {
            debug!(
                turns = summary.turns,
                completed = summary.completed,
                errored = summary.errored,
                input_errors = summary.input_errors,
                "session finished"
            );
            false
        }
        _ = &mut writer => {
            debug!("outbound side closed");
            true
        }
        () = shutdown.cancelled() => {
            info!("server shutting down, closing session");
            false
        }
    };

    drop(channel);
    reader.abort();
    if !writer_finished && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        warn!("writer did not drain in time");
        writer.abort();
    }

    info!(
        duration_ms = u64::try_from(permit.age().as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
    drop(permit);
}

/// Forward outbound events and send periodic Pings. Ends when the session
/// drops its sender (after flushing), when a send fails, or when the client
/// has been silent past the heartbeat timeout.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<WireEvent>,
    liveness: Arc<Liveness>,
    options: SessionOptions,
) {
    let mut ping_interval = tokio::time::interval(options.heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            event = out_rx.recv() => {
                let Some(event) = event else { break };
                trace!(kind = event.kind(), "sending event");
                if ws_tx.send(Message::Text(event.to_json().into())).await.is_err() {
                    debug!("socket closed while sending");
                    return;
                }
            }
            _ = ping_interval.tick() => {
                if liveness.idle_for() > options.heartbeat_timeout {
                    warn!(
                        timeout_secs = options.heartbeat_timeout.as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
}

/// Feed inbound frames to the session. Ends on Close or when the socket
/// errors, which drops `in_tx` and tells the session the client is gone.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    in_tx: mpsc::Sender<String>,
    liveness: Arc<Liveness>,
) {
    while let Some(Ok(msg)) = ws_rx.next().await {
        liveness.mark_alive();
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    warn!(len = data.len(), "non-UTF8 binary frame ignored");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if in_tx.send(text).await.is_err() {
            break;
        }
    }
}
