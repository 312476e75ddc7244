//! Maps an upgrade request to the endpoint the client asked for.

use std::str::FromStr;

use rally_protocol::SessionId;
use rally_transport::UpgradeRequest;

const WS_PREFIX: &str = "/ws";
const CHAT_SEGMENT: &str = "chat";
const GAME_QUERY_PARAM: &str = "gameId";

/// Where a connection wants to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The presence and chat endpoint.
    Chat,
    /// A match session.
    Game(SessionId),
    /// Looks like a match path, but the id is not a session id. Treated
    /// the same as a session that does not exist.
    BadSession(String),
    /// Nothing is served here.
    Unknown,
}

impl Route {
    /// Resolves the request path (and `gameId` query parameter).
    ///
    /// Accepted shapes, each with an optional trailing slash:
    /// `/ws/chat`, `/ws/<session-id>`, and `/ws?gameId=<session-id>`.
    pub fn resolve(request: &UpgradeRequest) -> Self {
        let Some(rest) = request.path.strip_prefix(WS_PREFIX) else {
            return Self::Unknown;
        };
        let rest = rest.trim_end_matches('/');

        if rest.is_empty() {
            return match request.query_param(GAME_QUERY_PARAM) {
                Some(raw) => Self::session(raw),
                None => Self::Unknown,
            };
        }

        let Some(segment) = rest.strip_prefix('/') else {
            // `/wsfoo`
            return Self::Unknown;
        };
        if segment.contains('/') {
            return Self::Unknown;
        }
        if segment == CHAT_SEGMENT {
            return Self::Chat;
        }
        Self::session(segment)
    }

    fn session(raw: &str) -> Self {
        match SessionId::from_str(raw) {
            Ok(id) => Self::Game(id),
            Err(_) => Self::BadSession(raw.to_string()),
        }
    }
}
