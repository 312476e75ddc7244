//! The presence hub: who is online, which groups each connection is in,
//! and delivery of messages to those connections.
//!
//! # Concurrency
//!
//! All hub state lives behind one `tokio::sync::Mutex`, and every
//! operation that changes membership also enqueues its notifications
//! before releasing it. A roster broadcast therefore always reflects the
//! connect or disconnect that triggered it, and two racing connects for
//! the same user cannot reorder their rosters.
//!
//! Delivery never waits: each frame is `try_send`-ed onto the
//! connection's bounded outbound queue. A full or closed queue loses
//! that frame for that connection only.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rally_protocol::{
    ChatServerMessage, ChatTarget, Codec, Frame, Identity, JsonCodec, OnlineUser, UserId,
};
use rally_transport::{CloseReason, ConnectionId};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;

use crate::{ConnectionRef, Group, HubConfig, Outbound, OutboundSender, PresenceError};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct ConnEntry {
    sender: OutboundSender,
    /// Set for presence connections, `None` for game-only connections.
    user: Option<UserId>,
    groups: HashSet<Group>,
}

struct PresenceEntry {
    identity: Identity,
    conns: BTreeSet<ConnectionId>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnEntry>,
    groups: HashMap<Group, HashSet<ConnectionId>>,
    /// Ordered by user id so rosters come out in a stable order.
    presence: BTreeMap<UserId, PresenceEntry>,
}

impl HubState {
    fn join_group(&mut self, conn: ConnectionId, group: Group) {
        if let Some(entry) = self.connections.get_mut(&conn) {
            entry.groups.insert(group);
        }
        self.groups.entry(group).or_default().insert(conn);
    }

    fn leave_group(&mut self, conn: ConnectionId, group: Group) {
        if let Some(entry) = self.connections.get_mut(&conn) {
            entry.groups.remove(&group);
        }
        if let Some(members) = self.groups.get_mut(&group) {
            members.remove(&conn);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
    }

    fn roster(&self) -> Vec<OnlineUser> {
        self.presence
            .values()
            .map(|p| OnlineUser {
                id: p.identity.id,
                name: p.identity.display_name.clone(),
                avatar: p.identity.avatar.clone(),
            })
            .collect()
    }

    fn identity_of(&self, conn: ConnectionId) -> Result<&Identity, PresenceError> {
        self.connections
            .get(&conn)
            .and_then(|entry| entry.user)
            .and_then(|user| self.presence.get(&user))
            .map(|p| &p.identity)
            .ok_or(PresenceError::NotConnected(conn))
    }

    /// Queues `frame` for one connection. Returns `true` if it was queued.
    fn deliver(&self, conn: ConnectionId, frame: &Frame) -> bool {
        let Some(entry) = self.connections.get(&conn) else {
            return false;
        };
        match entry.sender.try_send(Outbound::Frame(frame.clone())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%conn, "outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(%conn, "outbound queue closed, dropping frame");
                false
            }
        }
    }

    fn deliver_group(&self, group: Group, frame: &Frame) -> usize {
        self.groups
            .get(&group)
            .map(|members| {
                members
                    .iter()
                    .filter(|conn| self.deliver(**conn, frame))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Every connection of every listed user, each once.
    fn connections_of(&self, users: impl IntoIterator<Item = UserId>) -> BTreeSet<ConnectionId> {
        users
            .into_iter()
            .filter_map(|user| self.presence.get(&user))
            .flat_map(|p| p.conns.iter().copied())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PresenceHub
// ---------------------------------------------------------------------------

/// Tracks online users and routes messages to groups of connections.
///
/// Presence connections (chat) are added with [`connect`](Self::connect)
/// and count towards the roster. Game connections are only
/// [`attach`](Self::attach)-ed to a match group and never appear online.
pub struct PresenceHub<C: Codec = JsonCodec> {
    state: Mutex<HubState>,
    codec: C,
    config: HubConfig,
}

impl PresenceHub<JsonCodec> {
    pub fn new(config: HubConfig) -> Self {
        Self::with_codec(config, JsonCodec)
    }
}

impl Default for PresenceHub<JsonCodec> {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl<C: Codec> PresenceHub<C> {
    pub fn with_codec(config: HubConfig, codec: C) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            codec,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // -- Presence -----------------------------------------------------------

    /// Brings a connection online for `identity`.
    ///
    /// The new connection first receives its own `self_id`, then every
    /// global connection (including this one) receives the full roster.
    /// Additional connections for an already-online user are normal.
    pub async fn connect(&self, identity: Identity, conn: ConnectionRef) -> Result<(), PresenceError> {
        let self_id = self.codec.frame(&ChatServerMessage::SelfId {
            user_id: identity.id,
            name: identity.display_name.clone(),
        })?;

        let mut state = self.state.lock().await;
        let user = identity.id;
        let conn_id = conn.id;

        state.connections.insert(
            conn_id,
            ConnEntry {
                sender: conn.sender,
                user: Some(user),
                groups: HashSet::new(),
            },
        );
        state.join_group(conn_id, Group::Global);

        let entry = state.presence.entry(user).or_insert_with(|| PresenceEntry {
            identity,
            conns: BTreeSet::new(),
        });
        entry.conns.insert(conn_id);
        let devices = entry.conns.len();

        tracing::info!(user_id = %user, conn = %conn_id, devices, "user connected");

        state.deliver(conn_id, &self_id);
        self.broadcast_roster(&state)
    }

    /// Takes a connection offline and out of every group it was in.
    ///
    /// The user stays online while any other connection remains. A roster
    /// broadcast follows whenever the connection was a presence
    /// connection, even if the roster did not change.
    ///
    /// Returns `true` if this was the user's last connection.
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<bool, PresenceError> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.connections.remove(&conn) else {
            return Ok(false);
        };

        for group in &entry.groups {
            if let Some(members) = state.groups.get_mut(group) {
                members.remove(&conn);
                if members.is_empty() {
                    state.groups.remove(group);
                }
            }
        }

        let Some(user) = entry.user else {
            tracing::debug!(%conn, "game connection released");
            return Ok(false);
        };

        let went_offline = match state.presence.get_mut(&user) {
            Some(p) => {
                p.conns.remove(&conn);
                p.conns.is_empty()
            }
            None => false,
        };
        if went_offline {
            state.presence.remove(&user);
        }

        tracing::info!(user_id = %user, %conn, went_offline, "user disconnected");
        self.broadcast_roster(&state)?;
        Ok(went_offline)
    }

    fn broadcast_roster(&self, state: &HubState) -> Result<(), PresenceError> {
        let frame = self.codec.frame(&ChatServerMessage::OnlineUsers {
            users: state.roster(),
        })?;
        let delivered = state.deliver_group(Group::Global, &frame);
        tracing::debug!(online = state.presence.len(), delivered, "roster broadcast");
        Ok(())
    }

    /// The current online roster, ordered by user id.
    pub async fn roster(&self) -> Vec<OnlineUser> {
        self.state.lock().await.roster()
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.state.lock().await.presence.contains_key(&user)
    }

    /// How many connections `user` currently has open.
    pub async fn device_count(&self, user: UserId) -> usize {
        self.state
            .lock()
            .await
            .presence
            .get(&user)
            .map_or(0, |p| p.conns.len())
    }

    // -- Groups -------------------------------------------------------------

    /// Adds a connection to a group, registering it first if the hub has
    /// not seen it. Adding it twice has no further effect.
    pub async fn attach(&self, conn: ConnectionRef, group: Group) {
        let mut state = self.state.lock().await;
        state
            .connections
            .entry(conn.id)
            .or_insert_with(|| ConnEntry {
                sender: conn.sender,
                user: None,
                groups: HashSet::new(),
            });
        state.join_group(conn.id, group);
        tracing::debug!(conn = %conn.id, %group, "attached to group");
    }

    /// Removes a connection from a group. A game-only connection left in
    /// no group is forgotten.
    pub async fn detach(&self, conn: ConnectionId, group: Group) {
        let mut state = self.state.lock().await;
        state.leave_group(conn, group);

        let forget = state
            .connections
            .get(&conn)
            .is_some_and(|e| e.user.is_none() && e.groups.is_empty());
        if forget {
            state.connections.remove(&conn);
        }
        tracing::debug!(%conn, %group, "detached from group");
    }

    /// Number of connections in a group.
    pub async fn group_size(&self, group: Group) -> usize {
        self.state
            .lock()
            .await
            .groups
            .get(&group)
            .map_or(0, HashSet::len)
    }

    /// Asks every connection in `group` to close. Membership is left
    /// alone; each connection detaches itself as it shuts down.
    pub async fn close_group(&self, group: Group, reason: CloseReason) -> usize {
        let state = self.state.lock().await;
        let Some(members) = state.groups.get(&group) else {
            return 0;
        };
        let closed = members
            .iter()
            .filter_map(|conn| state.connections.get(conn))
            .filter(|entry| entry.sender.try_send(Outbound::Close(reason.clone())).is_ok())
            .count();
        tracing::debug!(%group, closed, "group closed");
        closed
    }

    // -- Routing ------------------------------------------------------------

    /// Sends `msg` to every connection in `group`. Returns how many
    /// connections it was queued for.
    pub async fn route_broadcast<T: Serialize>(
        &self,
        group: Group,
        msg: &T,
    ) -> Result<usize, PresenceError> {
        let frame = self.codec.frame(msg)?;
        Ok(self.broadcast_frame(group, &frame).await)
    }

    /// Like [`route_broadcast`](Self::route_broadcast) for an
    /// already-encoded frame.
    pub async fn broadcast_frame(&self, group: Group, frame: &Frame) -> usize {
        self.state.lock().await.deliver_group(group, frame)
    }

    /// Sends `msg` to every connection of every target user, plus every
    /// connection of `echo_to` if given. Offline targets are skipped. Each
    /// connection receives the message once, however often it is named.
    pub async fn route_direct<T: Serialize>(
        &self,
        targets: &[UserId],
        echo_to: Option<UserId>,
        msg: &T,
    ) -> Result<usize, PresenceError> {
        let frame = self.codec.frame(msg)?;
        let state = self.state.lock().await;
        let conns = state.connections_of(targets.iter().copied().chain(echo_to));
        Ok(conns
            .into_iter()
            .filter(|conn| state.deliver(*conn, &frame))
            .count())
    }

    /// Routes a chat line from a presence connection.
    ///
    /// Without a target (or with an empty target list) the message goes to
    /// the whole global group. Otherwise it is private: delivered to every
    /// connection of each target and echoed to every connection of the
    /// sender.
    pub async fn send_chat(
        &self,
        from: ConnectionId,
        message: String,
        target: Option<ChatTarget>,
    ) -> Result<usize, PresenceError> {
        let len = message.chars().count();
        if len > self.config.max_message_chars {
            return Err(PresenceError::MessageTooLong {
                len,
                max: self.config.max_message_chars,
            });
        }

        let state = self.state.lock().await;
        let sender = state.identity_of(from)?.clone();
        let target = target.filter(|t| !t.is_empty());

        let Some(target) = target else {
            let frame = self.codec.frame(&ChatServerMessage::Chat {
                message,
                sender: sender.id,
                name: sender.display_name,
                private: false,
                target: None,
            })?;
            return Ok(state.deliver_group(Group::Global, &frame));
        };

        let ids = target.ids();
        let frame = self.codec.frame(&ChatServerMessage::Chat {
            message,
            sender: sender.id,
            name: sender.display_name,
            private: true,
            target: Some(target),
        })?;
        let conns = state.connections_of(ids.into_iter().chain(Some(sender.id)));
        let delivered = conns
            .into_iter()
            .filter(|conn| state.deliver(*conn, &frame))
            .count();
        tracing::debug!(user_id = %sender.id, delivered, "private chat routed");
        Ok(delivered)
    }

    /// Rebroadcasts a typing indicator from a presence connection to the
    /// global group. Nothing is retained.
    pub async fn send_typing(&self, from: ConnectionId, typing: bool) -> Result<usize, PresenceError> {
        let state = self.state.lock().await;
        let sender = state.identity_of(from)?;
        let (user, name) = (sender.id, sender.display_name.clone());
        let msg = if typing {
            ChatServerMessage::Typing { user, name }
        } else {
            ChatServerMessage::StopTyping { user, name }
        };
        let frame = self.codec.frame(&msg)?;
        Ok(state.deliver_group(Group::Global, &frame))
    }
}

impl<C: Codec> std::fmt::Debug for PresenceHub<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceHub")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
