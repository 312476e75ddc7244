//! Per-connection handler: routing, auth, and message dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Resolve the path → unknown paths close with `4008`
//!   2. Authenticate the offered token → failure closes with `4001`
//!   3. Start a writer task draining the connection's outbound queue
//!   4. Loop: receive frames → dispatch to the presence hub or match engine

use std::sync::Arc;
use std::time::Duration;

use rally_match::{JoinOutcome, MatchEngine};
use rally_presence::{ConnectionRef, Group, Outbound, OutboundReceiver, OutboundSender, PresenceHub};
use rally_protocol::{
    ChatClientMessage, Codec, GameClientMessage, GameServerMessage, Identity, SessionId, close,
};
use rally_transport::{CloseReason, Connection, ConnectionId, WebSocketConnection};

use crate::game::{leave_match, run_match};
use crate::server::ServerState;
use crate::{AuthError, Authenticator, RallyError, Route};

/// Drop guard that unregisters a chat connection from the hub.
///
/// `Drop` is synchronous, so the async cleanup runs in a spawned task.
struct PresenceGuard {
    hub: Arc<PresenceHub>,
    conn_id: ConnectionId,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            if let Err(e) = hub.disconnect(conn_id).await {
                tracing::debug!(%conn_id, error = %e, "presence disconnect failed");
            }
        });
    }
}

/// Drop guard that gives up a connection's seat (or spectator slot).
struct SeatGuard {
    engine: Arc<MatchEngine>,
    hub: Arc<PresenceHub>,
    session_id: SessionId,
    conn_id: ConnectionId,
}

impl Drop for SeatGuard {
    fn drop(&mut self) {
        tokio::spawn(leave_match(
            Arc::clone(&self.engine),
            Arc::clone(&self.hub),
            self.session_id,
            self.conn_id,
        ));
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authenticator>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A>>,
) -> Result<(), RallyError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();

    // --- Step 1: Route ---
    let route = Route::resolve(conn.request());
    tracing::debug!(%conn_id, ?route, "handling new connection");
    if route == Route::Unknown {
        tracing::info!(%conn_id, path = %conn.request().path, "no endpoint at path");
        conn.close(Some(close::unknown_route())).await?;
        return Ok(());
    }

    // --- Step 2: Authenticate ---
    let identity = match authenticate(&conn, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(%conn_id, error = %e, "authentication failed");
            conn.close(Some(close::auth_failed())).await?;
            return Err(e.into());
        }
    };
    tracing::info!(%conn_id, user_id = %identity.id, "authenticated");

    let session_id = match route {
        Route::Chat => None,
        Route::Game(id) => Some(id),
        Route::BadSession(raw) => {
            tracing::info!(%conn_id, session = %raw, "malformed session id");
            conn.close(Some(close::session_not_found())).await?;
            return Ok(());
        }
        Route::Unknown => return Ok(()),
    };

    // --- Step 3: Writer ---
    let (conn_ref, outbound) = ConnectionRef::channel(conn_id, state.hub.config().outbound_capacity);
    let sender = conn_ref.sender.clone();
    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbound,
        state.config.send_timeout,
    ));

    // --- Step 4: Message loop ---
    let result = match session_id {
        None => run_chat(&conn, &state, identity, conn_ref).await,
        Some(id) => run_game(&conn, &state, id, identity, conn_ref).await,
    };

    // The hub may still hold a sender for a moment, so ask the writer to
    // finish explicitly instead of waiting for the queue to close.
    let _ = sender.try_send(Outbound::Close(close::normal()));
    drop(sender);
    if let Err(e) = writer.await {
        tracing::debug!(%conn_id, error = %e, "writer task failed");
    }
    result
}

async fn authenticate<A: Authenticator>(
    conn: &WebSocketConnection,
    state: &ServerState<A>,
) -> Result<Identity, AuthError> {
    let token = conn
        .request()
        .token
        .as_deref()
        .ok_or(AuthError::MissingCredential)?;
    state.auth.authenticate(token).await
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

async fn run_chat<A: Authenticator>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A>>,
    identity: Identity,
    conn_ref: ConnectionRef,
) -> Result<(), RallyError> {
    let conn_id = conn_ref.id;
    let user_id = identity.id;
    let sender = conn_ref.sender.clone();

    state.hub.connect(identity, conn_ref).await?;
    let _guard = PresenceGuard {
        hub: Arc::clone(&state.hub),
        conn_id,
    };

    while let Some(data) = next_frame(conn, &sender, state.config.idle_timeout).await {
        let msg: ChatClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, %user_id, error = %e, "failed to decode chat frame");
                continue;
            }
        };

        let result = match msg {
            ChatClientMessage::Chat { message, target } => {
                state.hub.send_chat(conn_id, message, target).await
            }
            ChatClientMessage::Typing => state.hub.send_typing(conn_id, true).await,
            ChatClientMessage::StopTyping => state.hub.send_typing(conn_id, false).await,
        };
        if let Err(e) = result {
            tracing::debug!(%conn_id, %user_id, error = %e, "chat message dropped");
        }
    }

    // _guard drops here → presence disconnect fires.
    Ok(())
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

async fn run_game<A: Authenticator>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A>>,
    session_id: SessionId,
    identity: Identity,
    conn_ref: ConnectionRef,
) -> Result<(), RallyError> {
    let conn_id = conn_ref.id;
    let sender = conn_ref.sender.clone();
    let group = Group::Match(session_id);

    // In the group before seated: an opponent joining right after us
    // broadcasts `gameStart` to whoever is attached at that moment.
    state.hub.attach(conn_ref, group).await;

    // `assign` is queued under the session lock, ahead of any `gameStart`.
    let queue_assign = |outcome: &JoinOutcome| {
        let assign = GameServerMessage::Assign { role: outcome.role };
        match state.codec.frame(&assign) {
            Ok(frame) => {
                if sender.try_send(Outbound::Frame(frame)).is_err() {
                    tracing::debug!(%session_id, %conn_id, "assign not queued");
                }
            }
            Err(e) => tracing::warn!(%session_id, %conn_id, error = %e, "failed to encode assign"),
        }
    };

    let outcome = match state
        .engine
        .join_with(session_id, conn_id, identity, queue_assign)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            state.hub.detach(conn_id, group).await;
            let _ = sender.send(Outbound::Close(e.close_reason())).await;
            return Err(e.into());
        }
    };
    let _guard = SeatGuard {
        engine: Arc::clone(&state.engine),
        hub: Arc::clone(&state.hub),
        session_id,
        conn_id,
    };
    let role = outcome.role;

    if let Some(start) = outcome.started {
        state
            .hub
            .route_broadcast(
                group,
                &GameServerMessage::GameStart {
                    left: start.left,
                    right: start.right,
                },
            )
            .await?;
        tokio::spawn(run_match(
            Arc::clone(&state.engine),
            Arc::clone(&state.hub),
            session_id,
        ));
    }

    while let Some(data) = next_frame(conn, &sender, state.config.idle_timeout).await {
        match state.codec.decode::<GameClientMessage>(&data) {
            Ok(GameClientMessage::PaddleMove { y }) => {
                if role.side().is_none() {
                    continue;
                }
                if let Err(e) = state.engine.set_paddle(session_id, role, y).await {
                    tracing::debug!(%session_id, %conn_id, error = %e, "session gone");
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(%session_id, %conn_id, error = %e, "failed to decode game frame");
            }
        }
    }

    // _guard drops here → leave, forfeit announcement, detach.
    Ok(())
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

/// Waits for the next inbound frame.
///
/// Returns `None` when the loop should stop: the peer closed or errored,
/// the idle limit passed, or the writer gave up on the connection.
async fn next_frame(
    conn: &WebSocketConnection,
    sender: &OutboundSender,
    idle_timeout: Option<Duration>,
) -> Option<Vec<u8>> {
    let conn_id = conn.id();
    let recv = async {
        match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.recv()).await,
            None => Ok(conn.recv().await),
        }
    };

    tokio::select! {
        received = recv => match received {
            Ok(Ok(Some(data))) => Some(data),
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                None
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection idle, closing");
                None
            }
        },
        () = sender.closed() => {
            tracing::debug!(%conn_id, "writer stopped");
            None
        }
    }
}

/// Drains a connection's outbound queue onto the socket.
///
/// A write that exceeds `send_timeout` marks the client as a slow
/// consumer: it is closed with `1008` and the queue is abandoned.
async fn write_loop(
    conn: Arc<WebSocketConnection>,
    mut outbound: OutboundReceiver,
    send_timeout: Duration,
) {
    let conn_id = conn.id();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                match tokio::time::timeout(send_timeout, conn.send_text(frame.as_str())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "send failed");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(%conn_id, ?send_timeout, "send stalled, closing slow consumer");
                        close_with(&conn, close::slow_consumer(), send_timeout).await;
                        break;
                    }
                }
            }
            Outbound::Close(reason) => {
                close_with(&conn, reason, send_timeout).await;
                break;
            }
        }
    }
}

async fn close_with(conn: &WebSocketConnection, reason: CloseReason, limit: Duration) {
    let conn_id = conn.id();
    let code = reason.code;
    match tokio::time::timeout(limit, conn.close(Some(reason))).await {
        Ok(Ok(())) => tracing::debug!(%conn_id, code, "connection closed"),
        Ok(Err(e)) => tracing::debug!(%conn_id, code, error = %e, "close failed"),
        Err(_) => tracing::debug!(%conn_id, code, "close timed out"),
    }
}
