//! DHT publisher advertising this node under a rendezvous namespace.

use std::time::Duration;

use distributed_topic_tracker::{unix_minute, RecordPublisher};
use ed25519_dalek::SigningKey;
use iroh::{Endpoint, SecretKey};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use super::record::PeerRecord;
use super::topic::{secret_from_namespace, topic_from_namespace};

/// Configuration for DHT publishing.
#[derive(Debug, Clone)]
pub struct DhtPublisherConfig {
    /// How often to republish the record. Default: 30 seconds.
    pub publish_interval: Duration,
}

impl Default for DhtPublisherConfig {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_secs(30),
        }
    }
}

/// Tracker handle for `namespace`, signing with `secret_key`.
///
/// The iroh secret key is an Ed25519 key compatible with ed25519-dalek, so
/// every record is signed by the node it describes.
pub(crate) fn record_publisher(namespace: &str, secret_key: &SecretKey) -> RecordPublisher {
    let signing_key = SigningKey::from_bytes(&secret_key.to_bytes());
    let verifying_key = signing_key.verifying_key();

    RecordPublisher::new(
        topic_from_namespace(namespace),
        verifying_key,
        signing_key,
        None, // No secret rotation
        secret_from_namespace(namespace),
    )
}

/// Publishes this node's record to the DHT on a fixed interval.
///
/// Each node writes its own signed record, so any number of peers can be
/// registered in the same minute.
pub struct DhtPublisher {
    publisher: RecordPublisher,
    endpoint: Endpoint,
    namespace: String,
    config: DhtPublisherConfig,
}

impl DhtPublisher {
    /// Create a publisher for `endpoint` under `namespace`.
    pub fn new(endpoint: &Endpoint, namespace: &str, config: DhtPublisherConfig) -> Self {
        Self {
            publisher: record_publisher(namespace, endpoint.secret_key()),
            endpoint: endpoint.clone(),
            namespace: namespace.to_string(),
            config,
        }
    }

    /// Start the background publishing task. It stops when `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let span = tracing::debug_span!("dht_publisher", namespace = %self.namespace);
        tokio::spawn(self.run(shutdown).instrument(span))
    }

    async fn run(self, shutdown: CancellationToken) {
        info!("Starting DHT publisher");

        // The first tick fires at once and doubles as the initial publish.
        let mut interval = tokio::time::interval(self.config.publish_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.publish_once() => {}
                    }
                }
            }
        }
        info!("DHT publisher shutting down");
    }

    async fn publish_once(&self) {
        let minute = unix_minute(0);
        let addrs = self.endpoint.addr().ip_addrs().copied().collect();
        let content = PeerRecord::new(self.endpoint.id(), addrs);

        match self.publisher.new_record(minute, content) {
            Ok(record) => {
                if let Err(e) = self.publisher.publish_record(record).await {
                    error!("Failed to publish DHT record: {}", e);
                } else {
                    debug!(minute = minute, "Published DHT record");
                }
            }
            Err(e) => {
                error!("Failed to create DHT record: {}", e);
            }
        }
    }
}
