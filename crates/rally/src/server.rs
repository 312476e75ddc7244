//! `RallyServer` builder and accept loop.
//!
//! The server ties the layers together: transport → routing → match
//! engine or presence hub. It owns both registries; nothing is global, so
//! tests can run many servers side by side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rally_match::{MatchConfig, MatchEngine, NoopReporter, ResultReporter};
use rally_presence::{Group, HubConfig, PresenceHub};
use rally_protocol::{GameServerMessage, JsonCodec, SessionId, close};
use rally_transport::{Transport, WebSocketTransport};

use crate::game::broadcast_game_over;
use crate::handler::handle_connection;
use crate::{Authenticator, RallyError};

/// Everything tunable about a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,
    pub match_config: MatchConfig,
    pub hub_config: HubConfig,
    /// Longest a single outbound write may take before the client is
    /// treated as stalled and closed with `1008`.
    pub send_timeout: Duration,
    /// Close connections that send nothing for this long. `None` keeps
    /// quiet connections (spectators, idle chat) open indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            match_config: MatchConfig::default(),
            hub_config: HubConfig::default(),
            send_timeout: Duration::from_secs(2),
            idle_timeout: None,
        }
    }
}

/// Shared state handed to every connection task.
pub(crate) struct ServerState<A: Authenticator> {
    pub(crate) engine: Arc<MatchEngine>,
    pub(crate) hub: Arc<PresenceHub>,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Rally server.
///
/// ```rust,ignore
/// let server = RallyServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .match_config(MatchConfig::default().with_winning_score(11))
///     .reporter(Arc::new(my_results_sink))
///     .build(my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct RallyServerBuilder {
    config: ServerConfig,
    reporter: Arc<dyn ResultReporter>,
}

impl RallyServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.config.match_config = config;
        self
    }

    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.config.hub_config = config;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Where finished match results go. Defaults to discarding them.
    pub fn reporter(mut self, reporter: Arc<dyn ResultReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Binds the listener and assembles the server.
    ///
    /// # Errors
    /// Returns `RallyError::Transport` if the address cannot be bound.
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<RallyServer<A>, RallyError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let engine = MatchEngine::with_reporter(self.config.match_config.clone(), self.reporter);
        let hub = PresenceHub::new(self.config.hub_config.clone());

        let state = Arc::new(ServerState {
            engine: Arc::new(engine),
            hub: Arc::new(hub),
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RallyServer { transport, state })
    }
}

impl Default for RallyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Rally server.
///
/// Call [`run()`](Self::run) to start accepting connections. Grab
/// [`engine()`](Self::engine) first if you need to create sessions.
pub struct RallyServer<A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
}

impl<A: Authenticator> RallyServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The match registry. Clone the `Arc` to keep it after `run()`.
    pub fn engine(&self) -> &Arc<MatchEngine> {
        &self.state.engine
    }

    /// The presence hub. Clone the `Arc` to keep it after `run()`.
    pub fn hub(&self) -> &Arc<PresenceHub> {
        &self.state.hub
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// A cloneable handle for managing sessions while the server runs.
    pub fn handle(&self) -> RallyHandle {
        RallyHandle {
            engine: Arc::clone(&self.state.engine),
            hub: Arc::clone(&self.state.hub),
        }
    }

    /// Runs the accept loop until the process exits.
    ///
    /// Each accepted connection gets its own task; an error in one is
    /// logged and never reaches the loop.
    pub async fn run(mut self) -> Result<(), RallyError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Rally server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Session administration for a running server.
///
/// Unlike calling [`MatchEngine::delete_session`] directly, deleting
/// through the handle tells the connected players and spectators.
#[derive(Clone)]
pub struct RallyHandle {
    engine: Arc<MatchEngine>,
    hub: Arc<PresenceHub>,
}

impl RallyHandle {
    pub fn engine(&self) -> &Arc<MatchEngine> {
        &self.engine
    }

    pub fn hub(&self) -> &Arc<PresenceHub> {
        &self.hub
    }

    /// Creates a session and returns its id.
    pub async fn create_session(&self) -> SessionId {
        self.engine.create_session().await
    }

    /// Removes a session and closes every connection attached to it.
    ///
    /// An active match is announced as abandoned first. Its result is
    /// reported once, by the engine.
    ///
    /// # Errors
    /// Returns `RallyError::Match` if the session does not exist.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), RallyError> {
        let game_over = self.engine.delete_session(id).await?;
        if let Some(over) = game_over {
            broadcast_game_over(&self.hub, id, GameServerMessage::GameOver(over)).await;
        }
        let closed = self.hub.close_group(Group::Match(id), close::game_closed()).await;
        tracing::info!(session_id = %id, closed, "session connections closed");
        Ok(())
    }
}
