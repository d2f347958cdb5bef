use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ConnectionRegistry, OUTBOUND_BUFFER};
use crate::models::UserId;
use crate::state::AppState;

const PING: &str = "ping";
const PONG: &str = "pong";

/// Owns one upgraded socket for its lifetime: registers it, runs the
/// read pump inline, and spawns the write pump that bridges the
/// registry's outbound queue to the sink.
pub async fn handle_socket(state: AppState, user_id: UserId, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    state.registry.register(user_id, conn_id, outbound_tx).await;

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(sink, outbound_rx, user_id));

    read_pump(stream, &state.registry, user_id).await;

    // The reader returning is the single teardown trigger for this
    // connection. Dropping the registry entry closes the outbound queue,
    // which stops the write pump.
    state.registry.unregister_conn(user_id, conn_id).await;
    let _ = writer.await;
}

/// Blocks on inbound frames. This subsystem is push-only: the only
/// inbound traffic it answers is the application-level keepalive; real
/// client sends go through the REST surface.
async fn read_pump(mut stream: SplitStream<WebSocket>, registry: &ConnectionRegistry, user_id: UserId) {
    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(text)) if text == PING => {
                // Reply through the outbound queue so only the write pump
                // ever touches the sink.
                registry.send(user_id, PONG.to_string()).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(%user_id, "websocket closed by peer");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(other) => {
                tracing::debug!(%user_id, frame = ?other, "discarding inbound frame");
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "websocket read error");
                break;
            }
        }
    }
}

/// Drains the outbound queue into the socket. A write error ends the
/// loop without retry; the read pump's failure detection owns the full
/// teardown. A closed queue (unregister or supersede) sends a close
/// frame and terminates.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    user_id: UserId,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(frame)).await {
            tracing::warn!(%user_id, error = %e, "websocket write failed");
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
