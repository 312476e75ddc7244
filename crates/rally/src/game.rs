//! The per-session tick loop and seat cleanup.

use std::sync::Arc;

use rally_match::{MatchEngine, Ticker};
use rally_presence::{Group, PresenceHub};
use rally_protocol::{GameServerMessage, SessionId};
use rally_transport::ConnectionId;

/// Drives one active match until it finishes or disappears.
///
/// Spawned by the join that fills the second seat, so there is exactly
/// one loop per match. The status check at the top of every iteration is
/// what stops it after a forfeit or an administrative delete.
pub(crate) async fn run_match(engine: Arc<MatchEngine>, hub: Arc<PresenceHub>, session_id: SessionId) {
    let group = Group::Match(session_id);
    let mut ticker = Ticker::new(engine.config().tick_period());
    tracing::info!(%session_id, period = ?ticker.period(), "match loop started");

    loop {
        match engine.status(session_id).await {
            Ok(status) if status.is_active() => {}
            _ => break,
        }

        ticker.wait().await;

        let output = match engine.tick(session_id).await {
            Ok(Some(output)) => output,
            Ok(None) | Err(_) => break,
        };

        if let Err(e) = hub
            .route_broadcast(group, &GameServerMessage::State(output.delta))
            .await
        {
            tracing::warn!(%session_id, error = %e, "state broadcast failed");
        }

        if let Some(over) = output.game_over {
            broadcast_game_over(&hub, session_id, GameServerMessage::GameOver(over)).await;
            break;
        }
    }

    tracing::info!(
        %session_id,
        ticks = ticker.tick_count(),
        overruns = ticker.total_overruns(),
        "match loop stopped"
    );
}

/// Removes a connection from its match and the match's fanout group.
///
/// A departure that ends an active match is announced to everyone still
/// watching before the connection is detached.
pub(crate) async fn leave_match(
    engine: Arc<MatchEngine>,
    hub: Arc<PresenceHub>,
    session_id: SessionId,
    conn_id: ConnectionId,
) {
    match engine.leave(session_id, conn_id).await {
        Ok(outcome) => {
            if let Some(over) = outcome.game_over {
                broadcast_game_over(&hub, session_id, GameServerMessage::GameOver(over)).await;
            }
        }
        Err(e) => tracing::debug!(%session_id, %conn_id, error = %e, "leave skipped"),
    }
    hub.detach(conn_id, Group::Match(session_id)).await;
}

pub(crate) async fn broadcast_game_over(hub: &PresenceHub, session_id: SessionId, msg: GameServerMessage) {
    match hub.route_broadcast(Group::Match(session_id), &msg).await {
        Ok(delivered) => tracing::info!(%session_id, delivered, "game over announced"),
        Err(e) => tracing::warn!(%session_id, error = %e, "game over broadcast failed"),
    }
}
