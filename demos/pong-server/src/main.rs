//! Development pong server.
//!
//! Accepts `<id>:<name>` tokens without checking them, logs match results,
//! and opens sessions at startup so there is something to join:
//!
//! - with `RALLY_PLAYERS=ada,bob,cy` it schedules a round-robin and opens
//!   one session per pairing, logging who plays where;
//! - otherwise it opens a single session.
//!
//! Other environment knobs: `RALLY_BIND`, `RALLY_WINNING_SCORE`,
//! `RALLY_TICK_RATE`, and `RUST_LOG` (default `info`).

use std::sync::Arc;

use rally::prelude::*;
use rally::MatchEngine;

// ---------------------------------------------------------------------------
// Auth and results
// ---------------------------------------------------------------------------

/// Trusts whatever the client says. Never use outside development.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        parse_dev_token(token)
    }
}

/// `<id>` or `<id>:<name>`.
fn parse_dev_token(token: &str) -> Result<Identity, AuthError> {
    let (id, name) = match token.split_once(':') {
        Some((id, name)) if !name.trim().is_empty() => (id, name.trim().to_string()),
        Some(_) => return Err(AuthError::Rejected("empty name".into())),
        None => (token, format!("player-{token}")),
    };
    let id: u64 = id
        .trim()
        .parse()
        .map_err(|_| AuthError::Rejected("id must be a number".into()))?;
    Ok(Identity::new(UserId(id), name))
}

struct LogReporter;

impl ResultReporter for LogReporter {
    fn report(&self, session_id: SessionId, winner: Option<UserId>) {
        match winner {
            Some(user_id) => tracing::info!(%session_id, %user_id, "match result"),
            None => tracing::info!(%session_id, "match abandoned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn config_from_env(
    var: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig {
        bind_addr: "0.0.0.0:8080".to_string(),
        ..ServerConfig::default()
    };
    if let Some(addr) = var("RALLY_BIND") {
        config.bind_addr = addr;
    }
    if let Some(score) = var("RALLY_WINNING_SCORE") {
        config.match_config = config.match_config.with_winning_score(score.parse()?);
    }
    if let Some(rate) = var("RALLY_TICK_RATE") {
        config.match_config = config.match_config.with_tick_rate(rate.parse()?);
    }
    Ok(config)
}

fn players_from_env(var: impl Fn(&str) -> Option<String>) -> Vec<String> {
    var("RALLY_PLAYERS")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Opens the sessions players will join.
async fn open_sessions(engine: &MatchEngine, players: &[String]) {
    if players.len() < 2 {
        let session_id = engine.create_session().await;
        tracing::info!(%session_id, "open session: /ws/{session_id}");
        return;
    }

    let plan = schedule(players);
    tracing::info!(players = players.len(), rounds = plan.len(), "round-robin scheduled");
    for round in plan.rounds() {
        for pairing in &round.pairings {
            let session_id = engine.create_session().await;
            tracing::info!(
                round = round.number,
                left = %pairing.player_a,
                right = %pairing.player_b,
                %session_id,
                "pairing session opened"
            );
        }
        if let Some(bye) = &round.bye {
            tracing::info!(round = round.number, %bye, "bye");
        }
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let env = |key: &str| std::env::var(key).ok();
    let config = config_from_env(env)?;
    let players = players_from_env(env);

    let server = RallyServerBuilder::new()
        .config(config)
        .reporter(Arc::new(LogReporter))
        .build(DevAuth)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "pong server listening");

    open_sessions(server.engine(), &players).await;

    server.run().await?;
    Ok(())
}
