//! Per-connection handler: registration, resume, and the message loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive the first frame → authenticate its `player_id`
//!   2. Register with the connection registry, start the writer task
//!   3. Resume a running game, or run the first frame's action, or ack
//!   4. Loop: receive frames → dispatch → deliver reply and notices
//!
//! A handler whose player registers again on another socket is told to
//! stop, and its socket is closed once the writer drains.
//!
//! Every frame to the client goes through the connection's outbound
//! channel and the writer task; only registration errors, which happen
//! before the channel exists, are written to the socket directly.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use salvo_protocol::{Codec, PlayerId, Response, Status};
use salvo_session::{Authenticator, Release};
use salvo_store::SessionStore;
use salvo_transport::{Connection, ConnectionId, WebSocketConnection};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::Dispatched;
use crate::server::ServerState;
use crate::SalvoError;

/// Tag on replies to the first frame when it carries no action.
const REGISTER: &str = "register";
/// Tag on errors for frames whose action can't be determined.
const UNKNOWN: &str = "unknown";

/// Drop guard that runs disconnect cleanup when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async work.
struct ConnectionGuard<S: SessionStore, A: Authenticator, C: Codec> {
    player_id: PlayerId,
    conn_id: ConnectionId,
    state: Arc<ServerState<S, A, C>>,
}

impl<S: SessionStore, A: Authenticator, C: Codec> Drop for ConnectionGuard<S, A, C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            cleanup(&state, player_id, conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, A, C>>,
) -> Result<(), SalvoError>
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    let conn = Arc::new(conn);
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Registration ---
    let (player_id, first) = register(&conn, &state).await?;
    tracing::info!(%conn_id, %player_id, "player registered");

    // --- Step 2: Outbound channel, writer, registry record ---
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    let (stop_tx, mut stop) = oneshot::channel();
    state.shutdowns.lock().await.insert(conn_id, stop_tx);
    if let Some(old) = state.registry.register(player_id, conn_id, tx.clone()).await {
        if let Some(old_stop) = state.shutdowns.lock().await.remove(&old) {
            let _ = old_stop.send(());
        }
        tracing::info!(%player_id, replaced = %old, "previous connection replaced");
    }
    let _guard = ConnectionGuard {
        player_id,
        conn_id,
        state: Arc::clone(&state),
    };

    // --- Step 3: Resume takes priority over the first frame's action ---
    if let Some(resumed) = state.dispatcher.resume(player_id).await {
        deliver(&state, player_id, &tx, resumed).await;
    } else if let Some(action) = action_name(&first) {
        if !dispatch(&state, player_id, &tx, &action, &first).await {
            return Ok(());
        }
    } else {
        let _ = tx.send(Response::new(
            Status::Ok,
            REGISTER,
            "Registered",
            json!({ "player_id": player_id }),
        ));
    }

    // --- Step 4: Message loop ---
    loop {
        let received = tokio::select! {
            _ = &mut stop => {
                tracing::info!(%player_id, %conn_id, "replaced by a newer connection, closing");
                break;
            }
            received = tokio::time::timeout(state.config.idle_timeout, conn.recv()) => received,
        };
        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%player_id, "connection idle, closing");
                break;
            }
        };

        let frame: Value = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode frame");
                let _ = tx.send(Response::error(UNKNOWN, "Invalid JSON"));
                continue;
            }
        };
        let Some(action) = action_name(&frame) else {
            let _ = tx.send(Response::error(UNKNOWN, "Missing action"));
            continue;
        };

        if !dispatch(&state, player_id, &tx, &action, &frame).await {
            break;
        }
    }

    // _guard drops here → disconnect cleanup fires.
    Ok(())
}

/// Reads the first frame and resolves the player identity in it.
///
/// On failure the client gets an error tagged `register` and the socket
/// is closed.
async fn register<S, A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<S, A, C>,
) -> Result<(PlayerId, Value), SalvoError>
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.registration_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(salvo_transport::TransportError::ConnectionClosed(
                "connection closed before registration".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            reject(conn, state, "Registration timed out").await;
            return Err(salvo_transport::TransportError::ConnectionClosed(
                "registration timed out".into(),
            )
            .into());
        }
    };

    let first: Value = match state.codec.decode(&data) {
        Ok(value) => value,
        Err(e) => {
            reject(conn, state, "Invalid JSON").await;
            return Err(e.into());
        }
    };

    let token = first.get("player_id").and_then(Value::as_str).unwrap_or("");
    match state.auth.authenticate(token).await {
        Ok(player_id) => Ok((player_id, first)),
        Err(e) => {
            tracing::debug!(conn_id = %conn.id(), error = %e, "registration rejected");
            reject(conn, state, &e.to_string()).await;
            Err(e.into())
        }
    }
}

/// Writes a `register` error straight to the socket and closes it.
async fn reject<S, A, C>(conn: &WebSocketConnection, state: &ServerState<S, A, C>, message: &str)
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    if let Ok(bytes) = state.codec.encode(&Response::error(REGISTER, message)) {
        let _ = conn.send_text(&String::from_utf8_lossy(&bytes)).await;
    }
    let _ = conn.close().await;
}

/// Runs one action and delivers its output. Returns `false` if the
/// connection should be torn down.
///
/// A panic inside the dispatcher is contained here: the caller still gets
/// an error envelope, and the connection then goes through normal cleanup.
async fn dispatch<S, A, C>(
    state: &Arc<ServerState<S, A, C>>,
    player_id: PlayerId,
    tx: &mpsc::UnboundedSender<Response>,
    action: &str,
    frame: &Value,
) -> bool
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    let outcome = AssertUnwindSafe(state.dispatcher.handle_action(action, frame, player_id))
        .catch_unwind()
        .await;

    match outcome {
        Ok(dispatched) => deliver(state, player_id, tx, dispatched).await,
        Err(_) => {
            tracing::error!(%player_id, action, "dispatcher panicked");
            let _ = tx.send(Response::error(action, "Internal server error"));
            false
        }
    }
}

/// Sends the reply to the caller, then each notice to its recipient.
async fn deliver<S, A, C>(
    state: &ServerState<S, A, C>,
    player_id: PlayerId,
    tx: &mpsc::UnboundedSender<Response>,
    dispatched: Dispatched,
) -> bool
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    if let Some(game) = dispatched.associate {
        state.registry.associate_with_game(player_id, game).await;
    }
    if tx.send(dispatched.reply).is_err() {
        return false;
    }
    for (recipient, notice) in dispatched.notices {
        if recipient == player_id {
            let _ = tx.send(notice);
        } else if !state.registry.send_to(recipient, notice).await {
            tracing::debug!(%player_id, %recipient, "notice not delivered, recipient offline");
        }
    }
    true
}

/// Drains the outbound channel onto the socket, one frame per response.
async fn write_loop<S, A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<S, A, C>>,
    mut rx: mpsc::UnboundedReceiver<Response>,
) where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    while let Some(response) = rx.recv().await {
        let bytes = match state.codec.encode(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(conn_id = %conn.id(), error = %e, "failed to encode response");
                continue;
            }
        };
        let sent = match std::str::from_utf8(&bytes) {
            Ok(text) => conn.send_text(text).await,
            Err(_) => conn.send(&bytes).await,
        };
        if let Err(e) = sent {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
    }
    let _ = conn.close().await;
}

/// Disconnect cleanup: release the registry record, drop queue entries,
/// and tell a running game's opponent.
///
/// Only the stop signal is cleared when a newer connection has taken
/// over this player.
async fn cleanup<S, A, C>(state: &ServerState<S, A, C>, player_id: PlayerId, conn_id: ConnectionId)
where
    S: SessionStore,
    A: Authenticator,
    C: Codec,
{
    state.shutdowns.lock().await.remove(&conn_id);
    let game_hint = match state.registry.release(player_id, conn_id).await {
        Release::Superseded => {
            tracing::debug!(%player_id, %conn_id, "connection superseded, skipping cleanup");
            return;
        }
        Release::Released { game_id } => game_id,
        Release::Absent => None,
    };

    for (recipient, notice) in state.dispatcher.disconnected(player_id, game_hint).await {
        if !state.registry.send_to(recipient, notice).await {
            tracing::debug!(%player_id, %recipient, "opponent offline, disconnect notice dropped");
        }
    }
    tracing::info!(%player_id, %conn_id, "player disconnected");
}

fn action_name(frame: &Value) -> Option<String> {
    frame.get("action").and_then(Value::as_str).map(str::to_owned)
}
