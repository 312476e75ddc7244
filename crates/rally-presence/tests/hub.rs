//! Integration tests for the presence hub.
//!
//! Each "socket" is just the receiving half of a connection's outbound
//! queue, so every test can see exactly what each connection was sent.

use std::sync::Arc;

use rally_presence::{
    ConnectionRef, Group, HubConfig, Outbound, OutboundReceiver, PresenceError, PresenceHub,
};
use rally_protocol::{ChatTarget, GameServerMessage, Identity, Role, SessionId, UserId, close};
use rally_transport::ConnectionId;
use serde_json::Value;

// =========================================================================
// Helpers
// =========================================================================

fn hub() -> PresenceHub {
    PresenceHub::new(HubConfig::default())
}

fn open(n: u64) -> (ConnectionRef, OutboundReceiver) {
    ConnectionRef::channel(ConnectionId::new(n), 64)
}

fn user(id: u64, name: &str) -> Identity {
    Identity::new(UserId(id), name)
}

/// Everything queued so far, decoded.
fn drain(rx: &mut OutboundReceiver) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        match item {
            Outbound::Frame(frame) => out.push(serde_json::from_str(frame.as_str()).unwrap()),
            Outbound::Close(reason) => panic!("unexpected close {reason:?}"),
        }
    }
    out
}

fn of_type<'a>(msgs: &'a [Value], ty: &str) -> Vec<&'a Value> {
    msgs.iter().filter(|m| m["type"] == ty).collect()
}

fn roster_ids(msg: &Value) -> Vec<u64> {
    msg["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_u64().unwrap())
        .collect()
}

// =========================================================================
// Presence
// =========================================================================

#[tokio::test]
async fn test_disconnect_keeps_user_online_until_last_connection() {
    let hub = hub();
    let (c1, _rx1) = open(1);
    let (c2, _rx2) = open(2);
    let (watcher, mut rx_w) = open(3);

    hub.connect(user(9, "watcher"), watcher).await.unwrap();
    hub.connect(user(1, "u"), c1).await.unwrap();
    hub.connect(user(1, "u"), c2).await.unwrap();
    assert_eq!(hub.device_count(UserId(1)).await, 2);
    drain(&mut rx_w);

    let last = hub.disconnect(ConnectionId::new(1)).await.unwrap();
    assert!(!last);
    assert!(hub.is_online(UserId(1)).await);
    let msgs = drain(&mut rx_w);
    let rosters = of_type(&msgs, "online_users");
    assert_eq!(rosters.len(), 1);
    assert_eq!(roster_ids(rosters[0]), vec![1, 9]);

    let last = hub.disconnect(ConnectionId::new(2)).await.unwrap();
    assert!(last);
    assert!(!hub.is_online(UserId(1)).await);
    let msgs = drain(&mut rx_w);
    let rosters = of_type(&msgs, "online_users");
    assert_eq!(roster_ids(rosters[0]), vec![9]);
}

#[tokio::test]
async fn test_connect_broadcasts_roster_to_everyone_online() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob").with_avatar("/b.png"), b).await.unwrap();

    let a_msgs = drain(&mut rx_a);
    let latest = of_type(&a_msgs, "online_users").pop().unwrap().clone();
    assert_eq!(roster_ids(&latest), vec![1, 2]);
    assert_eq!(latest["users"][1]["avatar"], "/b.png");

    let b_msgs = drain(&mut rx_b);
    assert_eq!(b_msgs[0]["type"], "self_id");
    assert_eq!(b_msgs[0]["name"], "bob");

    let roster = hub.roster().await;
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].name, "ada");
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_private_chat_reaches_target_devices_and_sender_only() {
    let hub = hub();
    let (u1, mut rx_u1) = open(1);
    let (u2a, mut rx_u2a) = open(2);
    let (u2b, mut rx_u2b) = open(3);
    let (u3, mut rx_u3) = open(4);
    hub.connect(user(1, "one"), u1).await.unwrap();
    hub.connect(user(2, "two"), u2a).await.unwrap();
    hub.connect(user(2, "two"), u2b).await.unwrap();
    hub.connect(user(3, "three"), u3).await.unwrap();
    for rx in [&mut rx_u1, &mut rx_u2a, &mut rx_u2b, &mut rx_u3] {
        drain(rx);
    }

    let delivered = hub
        .send_chat(
            ConnectionId::new(1),
            "psst".into(),
            Some(ChatTarget::One(UserId(2))),
        )
        .await
        .unwrap();
    assert_eq!(delivered, 3);

    for rx in [&mut rx_u1, &mut rx_u2a, &mut rx_u2b] {
        let msgs = drain(rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["type"], "chat");
        assert_eq!(msgs[0]["private"], true);
        assert_eq!(msgs[0]["sender"], 1);
        assert_eq!(msgs[0]["target"], 2);
    }
    assert!(drain(&mut rx_u3).is_empty());
}

#[tokio::test]
async fn test_global_chat_reaches_everyone_including_sender() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob"), b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    hub.send_chat(ConnectionId::new(2), "hello all".into(), None)
        .await
        .unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        let msgs = drain(rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["message"], "hello all");
        assert_eq!(msgs[0]["name"], "bob");
        assert_eq!(msgs[0]["private"], false);
    }
}

#[tokio::test]
async fn test_chat_with_empty_target_list_is_global() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob"), b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    hub.send_chat(ConnectionId::new(1), "hi".into(), Some(ChatTarget::Many(vec![])))
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_b)[0]["private"], false);
}

#[tokio::test]
async fn test_chat_to_offline_user_only_echoes_to_sender() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    hub.connect(user(1, "ada"), a).await.unwrap();
    drain(&mut rx_a);

    let delivered = hub
        .send_chat(
            ConnectionId::new(1),
            "anyone?".into(),
            Some(ChatTarget::Many(vec![UserId(77), UserId(1)])),
        )
        .await
        .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut rx_a).len(), 1);
}

#[tokio::test]
async fn test_chat_over_limit_is_rejected_and_not_routed() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    hub.connect(user(1, "ada"), a).await.unwrap();
    drain(&mut rx_a);

    let long = "é".repeat(301);
    let err = hub
        .send_chat(ConnectionId::new(1), long, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PresenceError::MessageTooLong { len: 301, max: 300 }
    ));
    assert!(drain(&mut rx_a).is_empty());

    // Exactly at the limit is fine.
    hub.send_chat(ConnectionId::new(1), "é".repeat(300), None)
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_a).len(), 1);
}

#[tokio::test]
async fn test_typing_indicators_rebroadcast_to_global() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob"), b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    hub.send_typing(ConnectionId::new(1), true).await.unwrap();
    hub.send_typing(ConnectionId::new(1), false).await.unwrap();

    let msgs = drain(&mut rx_b);
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0]["type"], "typing");
    assert_eq!(msgs[0]["user"], 1);
    assert_eq!(msgs[0]["name"], "ada");
    assert_eq!(msgs[1]["type"], "stop_typing");
}

// =========================================================================
// Groups
// =========================================================================

#[tokio::test]
async fn test_match_group_broadcast_reaches_only_attached_connections() {
    let hub = hub();
    let session = SessionId::new();
    let (g1, mut rx_g1) = open(1);
    let (g2, mut rx_g2) = open(2);
    let (chat, mut rx_chat) = open(3);
    hub.attach(g1, Group::Match(session)).await;
    hub.attach(g2, Group::Match(session)).await;
    hub.connect(user(3, "cy"), chat).await.unwrap();
    drain(&mut rx_chat);

    let sent = hub
        .route_broadcast(
            Group::Match(session),
            &GameServerMessage::Assign { role: Role::Left },
        )
        .await
        .unwrap();
    assert_eq!(sent, 2);
    assert_eq!(drain(&mut rx_g1)[0]["type"], "assign");
    assert_eq!(drain(&mut rx_g2).len(), 1);
    assert!(drain(&mut rx_chat).is_empty());

    // Game connections never count as online.
    assert_eq!(hub.roster().await.len(), 1);
}

#[tokio::test]
async fn test_attach_twice_delivers_once() {
    let hub = hub();
    let session = SessionId::new();
    let (g1, mut rx_g1) = open(1);
    hub.attach(g1.clone(), Group::Match(session)).await;
    hub.attach(g1, Group::Match(session)).await;
    assert_eq!(hub.group_size(Group::Match(session)).await, 1);

    hub.route_broadcast(Group::Match(session), &serde_json::json!({"type": "x"}))
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_g1).len(), 1);
}

#[tokio::test]
async fn test_detach_removes_connection_from_group() {
    let hub = hub();
    let session = SessionId::new();
    let (g1, mut rx_g1) = open(1);
    hub.attach(g1, Group::Match(session)).await;
    hub.detach(ConnectionId::new(1), Group::Match(session)).await;

    assert_eq!(hub.group_size(Group::Match(session)).await, 0);
    let sent = hub
        .route_broadcast(Group::Match(session), &serde_json::json!({"type": "x"}))
        .await
        .unwrap();
    assert_eq!(sent, 0);
    assert!(drain(&mut rx_g1).is_empty());
}

#[tokio::test]
async fn test_route_direct_dedupes_repeated_targets() {
    let hub = hub();
    let (a, mut rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob"), b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    let sent = hub
        .route_direct(
            &[UserId(2), UserId(2)],
            Some(UserId(2)),
            &serde_json::json!({"type": "ping"}),
        )
        .await
        .unwrap();
    assert_eq!(sent, 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
    assert!(drain(&mut rx_a).is_empty());
}

#[tokio::test]
async fn test_closed_receiver_does_not_block_others() {
    let hub = hub();
    let (a, rx_a) = open(1);
    let (b, mut rx_b) = open(2);
    hub.connect(user(1, "ada"), a).await.unwrap();
    hub.connect(user(2, "bob"), b).await.unwrap();
    drop(rx_a);
    drain(&mut rx_b);

    let delivered = hub
        .send_chat(ConnectionId::new(2), "still here".into(), None)
        .await
        .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
}

#[tokio::test]
async fn test_close_group_sends_close_to_members_only() {
    let hub = hub();
    let group = Group::Match(SessionId::new());
    let (player, mut rx_player) = open(1);
    let (chatter, mut rx_chatter) = open(2);
    hub.attach(player, group).await;
    hub.connect(user(2, "bob"), chatter).await.unwrap();
    drain(&mut rx_chatter);

    assert_eq!(hub.close_group(group, close::game_closed()).await, 1);
    assert!(matches!(rx_player.try_recv(), Ok(Outbound::Close(reason)) if reason.code == 1000));
    assert!(rx_chatter.try_recv().is_err());
    assert_eq!(hub.close_group(Group::Match(SessionId::new()), close::normal()).await, 0);
}

// =========================================================================
// Concurrency
// =========================================================================

/// The last roster a connection was sent, as JSON.
fn last_roster(rx: &mut OutboundReceiver) -> Value {
    drain(rx)
        .into_iter()
        .filter(|m| m["type"] == "online_users")
        .last()
        .expect("at least one roster")["users"]
        .clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connect_disconnect_same_user_keeps_rosters_current() {
    let hub = Arc::new(hub());
    let (watcher, mut rx_watcher) = ConnectionRef::channel(ConnectionId::new(9_000), 4_096);
    hub.connect(user(99, "watcher"), watcher).await.unwrap();

    // Eight tasks churn connections for the same user; the even ones
    // leave their last connection open.
    let mut tasks = Vec::new();
    for task in 0..8u64 {
        let hub = Arc::clone(&hub);
        tasks.push(tokio::spawn(async move {
            let mut kept = None;
            for round in 0..10u64 {
                let id = ConnectionId::new(1 + task * 100 + round);
                let (conn, rx) = ConnectionRef::channel(id, 4_096);
                hub.connect(user(1, "ada"), conn).await.unwrap();
                if task % 2 == 0 && round == 9 {
                    kept = Some((id, rx));
                } else {
                    hub.disconnect(id).await.unwrap();
                }
                tokio::task::yield_now().await;
            }
            kept
        }));
    }
    let mut survivors = Vec::new();
    for task in tasks {
        survivors.extend(task.await.unwrap());
    }

    assert!(hub.is_online(UserId(1)).await);
    assert_eq!(hub.device_count(UserId(1)).await, 4);
    let expected = serde_json::to_value(hub.roster().await).unwrap();
    assert_eq!(last_roster(&mut rx_watcher), expected);
    for (_, rx) in &mut survivors {
        assert_eq!(last_roster(rx), expected);
    }

    // Now drop the survivors concurrently.
    let mut tasks = Vec::new();
    for (id, _) in &survivors {
        let hub = Arc::clone(&hub);
        let id = *id;
        tasks.push(tokio::spawn(async move { hub.disconnect(id).await.unwrap() }));
    }
    let went_offline: usize = {
        let mut count = 0;
        for task in tasks {
            count += usize::from(task.await.unwrap());
        }
        count
    };

    assert_eq!(went_offline, 1);
    assert!(!hub.is_online(UserId(1)).await);
    assert_eq!(
        last_roster(&mut rx_watcher),
        serde_json::json!([{"id": 99, "name": "watcher", "avatar": null}])
    );
}
