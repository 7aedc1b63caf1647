//! Narrow interfaces to the network host and the gossip router.
//!
//! The chat core only talks to the network through these traits. The iroh
//! implementations live in [`crate::transport`] and [`crate::gossip`]; tests
//! substitute in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use iroh::EndpointId;

use crate::discovery::PeerAddressRecord;
use crate::Result;

/// Local network identity plus outbound connection establishment.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// This node's identifier.
    fn id(&self) -> EndpointId;

    /// Establish a connection to a discovered peer.
    async fn connect(&self, peer: PeerAddressRecord) -> Result<()>;
}

/// A gossip publish/subscribe router.
#[async_trait]
pub trait PubSub: Send + Sync + 'static {
    /// Handle to a joined topic.
    type Topic: Topic;

    /// Identifier this router publishes under.
    fn local_id(&self) -> EndpointId;

    /// Join the topic with the given name.
    async fn join(&self, topic: &str) -> Result<Self::Topic>;
}

/// A joined topic.
#[async_trait]
pub trait Topic: Send + Sync + 'static {
    /// Subscription produced by [`Topic::subscribe`].
    type Subscription: Subscription;

    /// Broadcast a payload to every peer in the topic.
    async fn publish(&self, data: Bytes) -> Result<()>;

    /// Start receiving messages from the topic.
    async fn subscribe(&self) -> Result<Self::Subscription>;

    /// Peers currently connected to this topic.
    fn list_peers(&self) -> Vec<EndpointId>;

    /// Leave the topic.
    async fn close(&self) -> Result<()>;
}

/// A message received from a topic.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw payload.
    pub content: Bytes,
    /// Peer the message arrived from.
    pub origin: EndpointId,
}

/// A stream of topic messages.
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Wait for the next message.
    ///
    /// An error means the subscription is gone for good.
    async fn next(&mut self) -> Result<Delivery>;

    /// Stop receiving. Subsequent [`Subscription::next`] calls fail.
    fn cancel(&mut self);
}
