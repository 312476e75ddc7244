//! Messages of the presence/chat channel (`/ws/chat/`).
//!
//! Tags are snake_case (`self_id`, `online_users`, `stop_typing`).

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Recipient(s) of a private chat message: one id or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatTarget {
    One(UserId),
    Many(Vec<UserId>),
}

impl ChatTarget {
    /// Flattens the target into a list of user ids.
    pub fn ids(&self) -> Vec<UserId> {
        match self {
            Self::One(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }

    /// `true` for an empty list, which clients use to mean "everyone".
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(ids) if ids.is_empty())
    }
}

/// What a client can send on the chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatClientMessage {
    /// A chat line. Without `target` it goes to everyone online.
    Chat {
        message: String,
        #[serde(default)]
        target: Option<ChatTarget>,
    },
    Typing,
    StopTyping,
}

/// One row of the online roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
}

/// What the server sends on the chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatServerMessage {
    /// Sent once, right after connect, so the client knows who it is.
    SelfId { user_id: UserId, name: String },

    Chat {
        message: String,
        sender: UserId,
        name: String,
        private: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<ChatTarget>,
    },

    /// The full roster, re-sent whenever anyone connects or disconnects.
    OnlineUsers { users: Vec<OnlineUser> },

    Typing { user: UserId, name: String },

    StopTyping { user: UserId, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_without_target_is_global() {
        let msg: ChatClientMessage =
            serde_json::from_str(r#"{"type":"chat","message":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ChatClientMessage::Chat {
                message: "hi".into(),
                target: None
            }
        );
    }

    #[test]
    fn test_chat_target_accepts_single_id_or_list() {
        let one: ChatClientMessage =
            serde_json::from_str(r#"{"type":"chat","message":"hi","target":"7"}"#).unwrap();
        let many: ChatClientMessage =
            serde_json::from_str(r#"{"type":"chat","message":"hi","target":[7, "8"]}"#)
                .unwrap();

        match one {
            ChatClientMessage::Chat { target: Some(t), .. } => {
                assert_eq!(t.ids(), vec![UserId(7)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match many {
            ChatClientMessage::Chat { target: Some(t), .. } => {
                assert_eq!(t.ids(), vec![UserId(7), UserId(8)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_typing_tags_are_snake_case() {
        let typing: ChatClientMessage = serde_json::from_str(r#"{"type":"typing"}"#).unwrap();
        let stop: ChatClientMessage = serde_json::from_str(r#"{"type":"stop_typing"}"#).unwrap();
        assert_eq!(typing, ChatClientMessage::Typing);
        assert_eq!(stop, ChatClientMessage::StopTyping);
    }

    #[test]
    fn test_unknown_client_type_is_rejected() {
        let result: Result<ChatClientMessage, _> =
            serde_json::from_str(r#"{"type":"identify","userId":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_self_id_json_format() {
        let json = serde_json::to_value(ChatServerMessage::SelfId {
            user_id: UserId(3),
            name: "cy".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "self_id", "user_id": 3, "name": "cy"}));
    }

    #[test]
    fn test_global_chat_omits_target() {
        let json = serde_json::to_value(ChatServerMessage::Chat {
            message: "hello".into(),
            sender: UserId(1),
            name: "ada".into(),
            private: false,
            target: None,
        })
        .unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["private"], false);
        assert!(json.get("target").is_none());
    }

    #[test]
    fn test_online_users_json_format() {
        let json = serde_json::to_value(ChatServerMessage::OnlineUsers {
            users: vec![OnlineUser {
                id: UserId(1),
                name: "ada".into(),
                avatar: None,
            }],
        })
        .unwrap();
        assert_eq!(json["type"], "online_users");
        assert_eq!(
            json["users"],
            serde_json::json!([{"id": 1, "name": "ada", "avatar": null}])
        );
    }

    #[test]
    fn test_empty_target_list_is_empty() {
        assert!(ChatTarget::Many(vec![]).is_empty());
        assert!(!ChatTarget::One(UserId(1)).is_empty());
    }
}
