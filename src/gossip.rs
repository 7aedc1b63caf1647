//! Chat rooms on top of iroh-gossip.
//!
//! Each room name maps to a deterministic [`TopicId`]. [`IrohPubSub`]
//! implements the [`PubSub`] seam used by [`crate::room::ChatRoom`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use iroh::EndpointId;
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use iroh_gossip::net::Gossip;
use iroh_gossip::proto::TopicId;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn, Instrument};

use crate::net::{Delivery, PubSub, Subscription, Topic};
use crate::{Error, Result};

/// Prefix applied to every room name before hashing it into a topic.
pub const TOPIC_PREFIX: &str = "room-peerchat-";

/// Name of the gossip topic backing a room.
pub fn topic_name(room: &str) -> String {
    format!("{TOPIC_PREFIX}{room}")
}

/// Derive a [`TopicId`] from a topic name.
pub fn topic_id(name: &str) -> TopicId {
    TopicId::from(*blake3::hash(name.as_bytes()).as_bytes())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Peers this node has connected to.
///
/// Used as bootstrap for newly joined topics, and pushed into topics that
/// are already joined so connected peers become gossip neighbors.
#[derive(Debug, Clone)]
pub struct KnownPeers {
    peers: Arc<Mutex<BTreeSet<EndpointId>>>,
    added: broadcast::Sender<EndpointId>,
}

impl KnownPeers {
    /// Create an empty peer set.
    pub fn new() -> Self {
        let (added, _) = broadcast::channel(64);
        Self {
            peers: Arc::new(Mutex::new(BTreeSet::new())),
            added,
        }
    }

    /// Record a peer. Returns false if it was already known.
    pub fn insert(&self, id: EndpointId) -> bool {
        let inserted = lock(&self.peers).insert(id);
        if inserted {
            // No receivers just means no topic is joined yet.
            let _ = self.added.send(id);
        }
        inserted
    }

    /// Current peers.
    pub fn snapshot(&self) -> Vec<EndpointId> {
        lock(&self.peers).iter().copied().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<EndpointId> {
        self.added.subscribe()
    }
}

impl Default for KnownPeers {
    fn default() -> Self {
        Self::new()
    }
}

/// [`PubSub`] backed by an iroh-gossip instance.
#[derive(Debug, Clone)]
pub struct IrohPubSub {
    gossip: Gossip,
    local_id: EndpointId,
    peers: KnownPeers,
}

impl IrohPubSub {
    /// Wrap a running gossip instance.
    pub fn new(gossip: Gossip, local_id: EndpointId, peers: KnownPeers) -> Self {
        Self {
            gossip,
            local_id,
            peers,
        }
    }
}

#[async_trait]
impl PubSub for IrohPubSub {
    type Topic = IrohTopic;

    fn local_id(&self) -> EndpointId {
        self.local_id
    }

    async fn join(&self, name: &str) -> Result<IrohTopic> {
        let id = topic_id(name);
        let bootstrap = self.peers.snapshot();
        debug!(topic = name, bootstrap = bootstrap.len(), "joining gossip topic");

        let topic = self.gossip.subscribe(id, bootstrap).await?;
        let (sender, receiver) = topic.split();

        let feeder = tokio::spawn(feed_peers(
            name.to_string(),
            sender.clone(),
            self.peers.subscribe(),
        ));

        Ok(IrohTopic {
            name: name.to_string(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            neighbors: Arc::new(Mutex::new(BTreeSet::new())),
            feeder,
        })
    }
}

/// Forward newly connected peers into a joined topic.
async fn feed_peers(
    topic: String,
    sender: GossipSender,
    mut added: broadcast::Receiver<EndpointId>,
) {
    loop {
        match added.recv().await {
            Ok(peer) => {
                if let Err(e) = sender.join_peers(vec![peer]).await {
                    let peer = peer.fmt_short();
                    debug!(topic = %topic, peer = %peer, "failed to add gossip peer: {e}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(topic = %topic, skipped = n, "peer feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// A joined iroh-gossip topic.
pub struct IrohTopic {
    name: String,
    sender: GossipSender,
    receiver: Mutex<Option<GossipReceiver>>,
    neighbors: Arc<Mutex<BTreeSet<EndpointId>>>,
    feeder: JoinHandle<()>,
}

#[async_trait]
impl Topic for IrohTopic {
    type Subscription = IrohSubscription;

    async fn publish(&self, data: Bytes) -> Result<()> {
        let span =
            tracing::trace_span!("gossip_broadcast", topic = %self.name, bytes = data.len());
        self.sender.broadcast(data).instrument(span).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<IrohSubscription> {
        let receiver = lock(&self.receiver)
            .take()
            .ok_or(Error::SubscriptionClosed)?;
        Ok(IrohSubscription {
            topic: self.name.clone(),
            receiver: Some(receiver),
            neighbors: Arc::clone(&self.neighbors),
        })
    }

    fn list_peers(&self) -> Vec<EndpointId> {
        lock(&self.neighbors).iter().copied().collect()
    }

    async fn close(&self) -> Result<()> {
        self.feeder.abort();
        lock(&self.receiver).take();
        lock(&self.neighbors).clear();
        debug!(topic = %self.name, "closed gossip topic");
        Ok(())
    }
}

impl Drop for IrohTopic {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

/// Receiving half of an [`IrohTopic`].
///
/// Neighbor events are folded into the topic's peer list; only received
/// messages are returned from [`Subscription::next`].
pub struct IrohSubscription {
    topic: String,
    receiver: Option<GossipReceiver>,
    neighbors: Arc<Mutex<BTreeSet<EndpointId>>>,
}

#[async_trait]
impl Subscription for IrohSubscription {
    async fn next(&mut self) -> Result<Delivery> {
        let receiver = self.receiver.as_mut().ok_or(Error::SubscriptionClosed)?;
        loop {
            match receiver.next().await {
                Some(Ok(Event::Received(msg))) => {
                    trace!(
                        topic = %self.topic,
                        from = %msg.delivered_from.fmt_short(),
                        len = msg.content.len(),
                        "gossip_recv"
                    );
                    return Ok(Delivery {
                        content: msg.content,
                        origin: msg.delivered_from,
                    });
                }
                Some(Ok(Event::NeighborUp(peer))) => {
                    debug!(topic = %self.topic, "gossip neighbor up: {}", peer.fmt_short());
                    lock(&self.neighbors).insert(peer);
                }
                Some(Ok(Event::NeighborDown(peer))) => {
                    debug!(topic = %self.topic, "gossip neighbor down: {}", peer.fmt_short());
                    lock(&self.neighbors).remove(&peer);
                }
                Some(Ok(Event::Lagged)) => {
                    warn!(topic = %self.topic, "gossip subscription lagged");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(Error::SubscriptionClosed),
            }
        }
    }

    fn cancel(&mut self) {
        if self.receiver.take().is_some() {
            debug!(topic = %self.topic, "cancelled gossip subscription");
        }
    }
}
