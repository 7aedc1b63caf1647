//! In-memory fakes of the `net` traits.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gossip_chat::discovery::PeerAddressRecord;
use gossip_chat::net::{Delivery, Host, PubSub, Subscription, Topic};
use gossip_chat::{ChatMessage, Error, Result};
use iroh::{EndpointId, SecretKey};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn endpoint_id(byte: u8) -> EndpointId {
    SecretKey::from([byte; 32]).public()
}

pub fn delivery(msg: &ChatMessage, origin: EndpointId) -> Delivery {
    Delivery {
        content: msg.encode().unwrap(),
        origin,
    }
}

/// Network side of a joined [`MockTopic`].
pub struct TopicControl {
    pub name: String,
    pub feed: mpsc::UnboundedSender<Result<Delivery>>,
    pub published: mpsc::UnboundedReceiver<Bytes>,
    pub closed: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
    pub fail_publish: Arc<AtomicBool>,
    pub peers: Arc<Mutex<Vec<EndpointId>>>,
}

impl TopicControl {
    /// Next published payload, decoded.
    pub async fn next_published(&mut self) -> ChatMessage {
        let bytes = tokio::time::timeout(WAIT, self.published.recv())
            .await
            .expect("timed out waiting for publish")
            .expect("topic dropped");
        ChatMessage::decode(&bytes).unwrap()
    }

    pub fn set_peers(&self, peers: Vec<EndpointId>) {
        *self.peers.lock().unwrap() = peers;
    }
}

#[derive(Default)]
pub struct MockPubSub {
    local: Option<EndpointId>,
    controls: Mutex<VecDeque<TopicControl>>,
    joins: AtomicUsize,
    pub fail_join: AtomicBool,
    pub fail_subscribe: AtomicBool,
}

impl MockPubSub {
    pub fn new(local: EndpointId) -> Self {
        Self {
            local: Some(local),
            ..Default::default()
        }
    }

    /// Control handle for the oldest joined topic not yet taken.
    pub fn take_control(&self) -> TopicControl {
        self.controls
            .lock()
            .unwrap()
            .pop_front()
            .expect("no topic joined")
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PubSub for MockPubSub {
    type Topic = MockTopic;

    fn local_id(&self) -> EndpointId {
        self.local.unwrap_or_else(|| endpoint_id(0))
    }

    async fn join(&self, topic: &str) -> Result<MockTopic> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(Error::connection("join refused"));
        }

        let (feed, feed_rx) = mpsc::unbounded_channel();
        let (published_tx, published) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let fail_publish = Arc::new(AtomicBool::new(false));
        let peers = Arc::new(Mutex::new(Vec::new()));

        self.controls.lock().unwrap().push_back(TopicControl {
            name: topic.to_string(),
            feed,
            published,
            closed: Arc::clone(&closed),
            cancelled: Arc::clone(&cancelled),
            fail_publish: Arc::clone(&fail_publish),
            peers: Arc::clone(&peers),
        });

        Ok(MockTopic {
            published: published_tx,
            feed: Mutex::new(Some(feed_rx)),
            fail_subscribe: self.fail_subscribe.load(Ordering::SeqCst),
            closed,
            cancelled,
            fail_publish,
            peers,
        })
    }
}

pub struct MockTopic {
    published: mpsc::UnboundedSender<Bytes>,
    feed: Mutex<Option<mpsc::UnboundedReceiver<Result<Delivery>>>>,
    fail_subscribe: bool,
    closed: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
    peers: Arc<Mutex<Vec<EndpointId>>>,
}

#[async_trait]
impl Topic for MockTopic {
    type Subscription = MockSubscription;

    async fn publish(&self, data: Bytes) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::connection("publish refused"));
        }
        self.published
            .send(data)
            .map_err(|_| Error::connection("test dropped the topic control"))
    }

    async fn subscribe(&self) -> Result<MockSubscription> {
        if self.fail_subscribe {
            return Err(Error::connection("subscribe refused"));
        }
        let feed = self.feed.lock().unwrap().take().ok_or(Error::SubscriptionClosed)?;
        Ok(MockSubscription {
            feed: Some(feed),
            cancelled: Arc::clone(&self.cancelled),
        })
    }

    fn list_peers(&self) -> Vec<EndpointId> {
        self.peers.lock().unwrap().clone()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSubscription {
    feed: Option<mpsc::UnboundedReceiver<Result<Delivery>>>,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn next(&mut self) -> Result<Delivery> {
        let feed = self.feed.as_mut().ok_or(Error::SubscriptionClosed)?;
        match feed.recv().await {
            Some(item) => item,
            None => Err(Error::SubscriptionClosed),
        }
    }

    fn cancel(&mut self) {
        self.feed = None;
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Host recording every connection attempt.
pub struct MockHost {
    id: EndpointId,
    failing: Vec<EndpointId>,
    pub attempts: Mutex<Vec<EndpointId>>,
    pub notify: mpsc::UnboundedSender<EndpointId>,
}

impl MockHost {
    pub fn new(
        id: EndpointId,
        failing: Vec<EndpointId>,
    ) -> (Self, mpsc::UnboundedReceiver<EndpointId>) {
        let (notify, rx) = mpsc::unbounded_channel();
        let host = Self {
            id,
            failing,
            attempts: Mutex::new(Vec::new()),
            notify,
        };
        (host, rx)
    }
}

#[async_trait]
impl Host for MockHost {
    fn id(&self) -> EndpointId {
        self.id
    }

    async fn connect(&self, peer: PeerAddressRecord) -> Result<()> {
        self.attempts.lock().unwrap().push(peer.id);
        let _ = self.notify.send(peer.id);
        if self.failing.contains(&peer.id) {
            return Err(Error::connection("unreachable"));
        }
        Ok(())
    }
}
