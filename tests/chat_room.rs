mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use common::{delivery, endpoint_id, MockPubSub, WAIT};
use gossip_chat::message::{PUBLISH_ERROR, SUBSCRIBE_ERROR};
use gossip_chat::net::Delivery;
use gossip_chat::{ChatMessage, ChatRoom, Error};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> Option<T> {
    timeout(WAIT, rx.recv()).await.expect("timed out waiting for channel")
}

#[tokio::test]
async fn test_empty_names_use_defaults() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    let room = ChatRoom::join(&pubsub, "", "").await.unwrap();
    let mut ctl = pubsub.take_control();

    assert_eq!(room.room_name(), "lobby");
    assert_eq!(room.user_name(), "New-user");
    assert_eq!(ctl.name, "room-peerchat-lobby");

    room.outbound().send("hi".into()).await.unwrap();
    assert_eq!(ctl.next_published().await.sender_name, "New-user");

    room.exit().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_publishes_exact_wire_json() {
    let local = endpoint_id(1);
    let pubsub = MockPubSub::new(local);
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let mut ctl = pubsub.take_control();
    assert_eq!(ctl.name, "room-peerchat-dev");

    room.outbound().send("hello".into()).await.unwrap();
    let raw = timeout(WAIT, ctl.published.recv()).await.unwrap().unwrap();

    let expected = format!(r#"{{"message":"hello","senderid":"{local}","sendername":"alice"}}"#);
    assert_eq!(std::str::from_utf8(&raw).unwrap(), expected);

    room.exit().await.unwrap();
}

#[tokio::test]
async fn test_publish_keeps_submission_order() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let mut ctl = pubsub.take_control();

    for text in ["one", "two", "three"] {
        room.outbound().send(text.into()).await.unwrap();
    }
    for text in ["one", "two", "three"] {
        assert_eq!(ctl.next_published().await.message, text);
    }

    room.exit().await.unwrap();
}

#[tokio::test]
async fn test_own_messages_are_filtered() {
    let local = endpoint_id(1);
    let remote = endpoint_id(2);
    let pubsub = MockPubSub::new(local);
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    let echo = ChatMessage::new("echo", local.to_string(), "alice");
    let other = ChatMessage::new("from bob", remote.to_string(), "bob");
    ctl.feed.send(Ok(delivery(&echo, local))).unwrap();
    ctl.feed.send(Ok(delivery(&other, remote))).unwrap();

    assert_eq!(recv(&mut room.inbound).await, Some(other));
    assert!(room.inbound.try_recv().is_err());

    room.exit().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_malformed_payload_is_reported_and_skipped() {
    let remote = endpoint_id(2);
    let pubsub = MockPubSub::new(endpoint_id(1));
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    ctl.feed
        .send(Ok(Delivery {
            content: Bytes::from_static(b"{not json"),
            origin: remote,
        }))
        .unwrap();
    let valid = ChatMessage::new("still here", remote.to_string(), "bob");
    ctl.feed.send(Ok(delivery(&valid, remote))).unwrap();

    let log = recv(&mut room.logs).await.unwrap();
    assert_eq!(log.prefix, SUBSCRIBE_ERROR);
    assert_eq!(log.message, "could not unmarshal JSON");
    assert_eq!(recv(&mut room.inbound).await, Some(valid));
    assert!(!room.is_closed());

    room.exit().await.unwrap();
}

#[tokio::test]
async fn test_inbound_preserves_transport_order_under_backpressure() {
    let remote = endpoint_id(2);
    let pubsub = MockPubSub::new(endpoint_id(1));
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    let messages: Vec<_> = (0..4)
        .map(|i| ChatMessage::new(format!("m{i}"), remote.to_string(), "bob"))
        .collect();
    for msg in &messages {
        ctl.feed.send(Ok(delivery(msg, remote))).unwrap();
    }
    // nobody is reading yet, the subscribe loop has to wait
    tokio::time::sleep(Duration::from_millis(50)).await;

    for msg in messages {
        assert_eq!(recv(&mut room.inbound).await, Some(msg));
    }

    room.exit().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_publish_failure_is_logged_and_loop_continues() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let mut ctl = pubsub.take_control();

    ctl.fail_publish.store(true, Ordering::SeqCst);
    room.outbound().send("lost".into()).await.unwrap();

    let log = recv(&mut room.logs).await.unwrap();
    assert_eq!(log.prefix, PUBLISH_ERROR);
    assert!(log.message.starts_with("could not publish message to topic"));

    ctl.fail_publish.store(false, Ordering::SeqCst);
    room.outbound().send("delivered".into()).await.unwrap();
    assert_eq!(ctl.next_published().await.message, "delivered");

    room.exit().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_subscription_error_shuts_the_room_down() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    ctl.feed.send(Err(Error::connection("transport gone"))).unwrap();

    let log = recv(&mut room.logs).await.unwrap();
    assert_eq!(log.prefix, SUBSCRIBE_ERROR);
    assert_eq!(log.message, "subscription has closed");
    assert_eq!(recv(&mut room.inbound).await, None);

    // the publish loop stops with the subscribe loop
    timeout(WAIT, room.outbound().closed()).await.unwrap();
    assert!(room.is_closed());
    assert!(room.outbound().send("too late".into()).await.is_err());

    room.exit().await.unwrap();
    assert!(ctl.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_exit_closes_topic_and_silences_channels() {
    let remote = endpoint_id(2);
    let pubsub = MockPubSub::new(endpoint_id(1));
    let mut room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    let mut inbound = std::mem::replace(&mut room.inbound, mpsc::channel(1).1);
    let mut logs = std::mem::replace(&mut room.logs, mpsc::channel(1).1);

    room.exit().await.unwrap();
    assert!(ctl.closed.load(Ordering::SeqCst));
    assert!(ctl.cancelled.load(Ordering::SeqCst));

    let late = ChatMessage::new("late", remote.to_string(), "bob");
    let _ = ctl.feed.send(Ok(delivery(&late, remote)));

    assert_eq!(recv(&mut inbound).await, None);
    assert_eq!(recv(&mut logs).await, None);
}

#[tokio::test]
async fn test_update_user_applies_to_later_messages() {
    let local = endpoint_id(1);
    let pubsub = MockPubSub::new(local);
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let mut ctl = pubsub.take_control();

    room.outbound().send("before".into()).await.unwrap();
    assert_eq!(ctl.next_published().await.sender_name, "alice");

    room.update_user("bob");
    assert_eq!(room.user_name(), "bob");

    room.outbound().send("after".into()).await.unwrap();
    let msg = ctl.next_published().await;
    assert_eq!(msg.sender_name, "bob");
    assert_eq!(msg.sender_id, local.to_string());

    room.exit().await.unwrap();
}

#[tokio::test]
async fn test_peer_list_reflects_topic() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let ctl = pubsub.take_control();

    assert!(room.peer_list().is_empty());
    ctl.set_peers(vec![endpoint_id(2), endpoint_id(3)]);
    assert_eq!(room.peer_list(), vec![endpoint_id(2), endpoint_id(3)]);

    room.exit().await.unwrap();
}

#[tokio::test]
async fn test_join_failure_is_reported() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    pubsub.fail_join.store(true, Ordering::SeqCst);

    match ChatRoom::join(&pubsub, "alice", "dev").await {
        Err(Error::TopicJoin { topic, .. }) => assert_eq!(topic, "room-peerchat-dev"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("join should fail"),
    }
}

#[tokio::test]
async fn test_subscribe_failure_closes_topic() {
    let pubsub = MockPubSub::new(endpoint_id(1));
    pubsub.fail_subscribe.store(true, Ordering::SeqCst);

    let result = ChatRoom::join(&pubsub, "alice", "dev").await;
    assert!(matches!(result, Err(Error::Subscribe { .. })));
    assert!(pubsub.take_control().closed.load(Ordering::SeqCst));
}

#[test_log::test(tokio::test)]
async fn test_message_sent_before_exit_is_published() {
    let local = endpoint_id(1);
    let pubsub = MockPubSub::new(local);
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();
    let mut ctl = pubsub.take_control();

    room.outbound().send("bye".into()).await.unwrap();
    room.exit().await.unwrap();

    let msg = ctl.next_published().await;
    assert_eq!(msg.message, "bye");
    assert_eq!(msg.sender_id, local.to_string());
    assert!(ctl.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_self_id_is_the_local_endpoint() {
    let local = endpoint_id(1);
    let pubsub = MockPubSub::new(local);
    let room = ChatRoom::join(&pubsub, "alice", "dev").await.unwrap();

    assert_eq!(room.self_id(), local);

    room.exit().await.unwrap();
}
