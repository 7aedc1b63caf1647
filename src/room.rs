//! A joined chat room: one gossip topic, a publish loop and a subscribe loop.
//!
//! Both loops run as separate tasks and share a single [`CancellationToken`].
//! Text written to [`ChatRoom::outbound`] is published; messages from other
//! peers arrive on [`ChatRoom::inbound`]; recoverable failures surface as
//! [`ChatLog`] entries on [`ChatRoom::logs`].

use std::sync::Arc;
use std::time::Duration;

use iroh::EndpointId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

use crate::gossip::topic_name;
use crate::message::{ChatLog, ChatMessage, PUBLISH_ERROR, SUBSCRIBE_ERROR};
use crate::net::{PubSub, Subscription, Topic};
use crate::{Error, Result};

/// User name used when none is given.
pub const DEFAULT_USER: &str = "New-user";
/// Room joined when none is given.
pub const DEFAULT_ROOM: &str = "lobby";

// Smallest bound tokio allows: one parked value, then the sender waits.
const CHANNEL_BOUND: usize = 1;

// Upper bound on a single broadcast, so `exit` cannot hang on a stuck topic.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// A chat room session.
///
/// Created by [`ChatRoom::join`], torn down by [`ChatRoom::exit`]. Dropping
/// the session without calling `exit` cancels both loops but does not wait
/// for them.
pub struct ChatRoom<P: PubSub> {
    /// Messages published by other peers, in transport order.
    ///
    /// Closed if the subscription fails.
    pub inbound: mpsc::Receiver<ChatMessage>,
    /// Diagnostics from both loops.
    pub logs: mpsc::Receiver<ChatLog>,
    outbound: mpsc::Sender<String>,
    room_name: String,
    user_name: watch::Sender<String>,
    self_id: EndpointId,
    cancel: CancellationToken,
    topic: Arc<P::Topic>,
    tasks: Vec<JoinHandle<()>>,
}

impl<P: PubSub> ChatRoom<P> {
    /// Join `room_name` as `user_name`, falling back to [`DEFAULT_ROOM`] and
    /// [`DEFAULT_USER`] for empty values.
    pub async fn join(pubsub: &P, user_name: &str, room_name: &str) -> Result<Self> {
        let user_name = non_empty_or(user_name, DEFAULT_USER);
        let room_name = non_empty_or(room_name, DEFAULT_ROOM);
        let topic_name = topic_name(&room_name);

        let topic = pubsub
            .join(&topic_name)
            .await
            .map_err(|e| Error::topic_join(&topic_name, e))?;

        let subscription = match topic.subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                if let Err(close_err) = topic.close().await {
                    debug!(topic = %topic_name, "failed to close topic: {close_err}");
                }
                return Err(Error::subscribe(&topic_name, e));
            }
        };

        let self_id = pubsub.local_id();
        let topic = Arc::new(topic);
        let cancel = CancellationToken::new();
        let (inbound_tx, inbound) = mpsc::channel(CHANNEL_BOUND);
        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_BOUND);
        let (logs_tx, logs) = mpsc::channel(CHANNEL_BOUND);
        let (user_tx, user_rx) = watch::channel(user_name.clone());

        let span = tracing::debug_span!("chat_room", room = %room_name);
        let subscriber = tokio::spawn(
            subscribe_loop(
                subscription,
                self_id,
                inbound_tx,
                logs_tx.clone(),
                cancel.clone(),
            )
            .instrument(span.clone()),
        );
        let publisher = tokio::spawn(
            publish_loop(
                Arc::clone(&topic),
                self_id.to_string(),
                user_rx,
                outbound_rx,
                logs_tx,
                cancel.clone(),
            )
            .instrument(span),
        );

        info!(room = %room_name, user = %user_name, "joined chat room");

        Ok(Self {
            inbound,
            logs,
            outbound,
            room_name,
            user_name: user_tx,
            self_id,
            cancel,
            topic,
            tasks: vec![subscriber, publisher],
        })
    }

    /// Sender for text to publish. Sends wait while the publish loop is busy.
    pub fn outbound(&self) -> &mpsc::Sender<String> {
        &self.outbound
    }

    /// Name of the joined room.
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Current display name.
    pub fn user_name(&self) -> String {
        self.user_name.borrow().clone()
    }

    /// Local endpoint id; messages from it are never delivered.
    pub fn self_id(&self) -> EndpointId {
        self.self_id
    }

    /// Whether the loops have been told to stop.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Peers currently connected to the room's topic.
    pub fn peer_list(&self) -> Vec<EndpointId> {
        self.topic.list_peers()
    }

    /// Change the display name used for subsequent messages.
    pub fn update_user(&self, user_name: impl Into<String>) {
        let user_name = user_name.into();
        debug!(room = %self.room_name, user = %user_name, "user name changed");
        self.user_name.send_replace(user_name);
    }

    /// Leave the room.
    ///
    /// Stops both loops and waits for them, then closes the topic. Text
    /// already accepted by [`ChatRoom::outbound`] is published first. Nothing
    /// is sent on `inbound` or `logs` once this returns.
    pub async fn exit(mut self) -> Result<()> {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(room = %self.room_name, "chat room task failed: {e}");
            }
        }
        self.topic.close().await?;
        info!(room = %self.room_name, "left chat room");
        Ok(())
    }
}

impl<P: PubSub> Drop for ChatRoom<P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Push a log entry unless the session is being cancelled.
async fn report(logs: &mpsc::Sender<ChatLog>, cancel: &CancellationToken, entry: ChatLog) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        sent = logs.send(entry) => {
            if sent.is_err() {
                trace!("log receiver dropped");
            }
        }
    }
}

async fn publish_loop<T: Topic>(
    topic: Arc<T>,
    self_id: String,
    user_name: watch::Receiver<String>,
    mut outbound: mpsc::Receiver<String>,
    logs: mpsc::Sender<ChatLog>,
    cancel: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            text = outbound.recv() => match text {
                Some(text) => text,
                None => break,
            },
        };

        let message = ChatMessage::new(text, self_id.clone(), user_name.borrow().clone());
        if let Err(e) = publish(&*topic, &message).await {
            warn!(error = %e, "could not publish message");
            let entry = ChatLog::new(
                PUBLISH_ERROR,
                format!("could not publish message to topic: {e}"),
            );
            report(&logs, &cancel, entry).await;
        }
    }

    // Text already handed over through `outbound` still goes out.
    outbound.close();
    while let Ok(text) = outbound.try_recv() {
        let message = ChatMessage::new(text, self_id.clone(), user_name.borrow().clone());
        if let Err(e) = publish(&*topic, &message).await {
            warn!(error = %e, "could not publish queued message");
        }
    }
    debug!("publish loop stopped");
}

async fn publish<T: Topic>(topic: &T, message: &ChatMessage) -> Result<()> {
    let payload = message.encode()?;
    tokio::time::timeout(PUBLISH_TIMEOUT, topic.publish(payload))
        .await
        .map_err(|_| Error::connection("publish timed out"))?
}

async fn subscribe_loop<S: Subscription>(
    mut subscription: S,
    self_id: EndpointId,
    inbound: mpsc::Sender<ChatMessage>,
    logs: mpsc::Sender<ChatLog>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                subscription.cancel();
                break;
            }
            next = subscription.next() => next,
        };

        let delivery = match next {
            Ok(delivery) => delivery,
            Err(e) => {
                drop(inbound);
                warn!(error = %e, "subscription has closed");
                let entry = ChatLog::new(SUBSCRIBE_ERROR, "subscription has closed");
                report(&logs, &cancel, entry).await;
                cancel.cancel();
                break;
            }
        };

        if delivery.origin == self_id {
            continue;
        }

        let message = match ChatMessage::decode(&delivery.content) {
            Ok(message) => message,
            Err(e) => {
                debug!(from = %delivery.origin, error = %e, "dropping malformed chat payload");
                let entry = ChatLog::new(SUBSCRIBE_ERROR, "could not unmarshal JSON");
                report(&logs, &cancel, entry).await;
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                subscription.cancel();
                break;
            }
            sent = inbound.send(message) => {
                if sent.is_err() {
                    trace!("inbound receiver dropped");
                }
            }
        }
    }
    debug!("subscribe loop stopped");
}
