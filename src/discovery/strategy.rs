//! The announce and advertise strategies, both backed by the DHT tracker.

use std::collections::HashSet;
use std::time::Duration;

use distributed_topic_tracker::{unix_minute, Record, RecordPublisher};
use futures_util::StreamExt;
use iroh::{Endpoint, EndpointId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::publisher::{record_publisher, DhtPublisher, DhtPublisherConfig};
use super::record::PeerRecord;
use super::{Discovery, PeerAddressRecord, PeerStream};
use crate::{Error, Result};

/// The endpoint to advertise plus the publishing settings.
#[derive(Clone)]
pub struct DhtRendezvous {
    endpoint: Endpoint,
    publisher: DhtPublisherConfig,
}

impl DhtRendezvous {
    /// Rendezvous for the endpoint, republishing every 30s.
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
            publisher: DhtPublisherConfig::default(),
        }
    }

    fn advertise(&self, namespace: &str, shutdown: CancellationToken) -> JoinHandle<()> {
        DhtPublisher::new(&self.endpoint, namespace, self.publisher.clone()).spawn(shutdown)
    }

    fn lookup(&self, namespace: &str, poll: Option<Duration>) -> PeerStream {
        let publisher = record_publisher(namespace, self.endpoint.secret_key());
        rendezvous_stream(publisher, namespace.to_string(), poll)
    }
}

/// Register, then keep searching the namespace.
#[derive(Clone)]
pub struct Announce {
    rendezvous: DhtRendezvous,
    poll_interval: Duration,
}

impl Announce {
    /// Create the strategy with a 60s poll interval.
    pub fn new(rendezvous: DhtRendezvous) -> Self {
        Self {
            rendezvous,
            poll_interval: Duration::from_secs(60),
        }
    }

    /// Set the DHT poll interval.
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }
}

impl Discovery for Announce {
    fn name(&self) -> &'static str {
        "announce"
    }

    fn advertise(&self, namespace: &str, shutdown: CancellationToken) -> JoinHandle<()> {
        self.rendezvous.advertise(namespace, shutdown)
    }

    fn find_peers(&self, namespace: &str) -> PeerStream {
        self.rendezvous.lookup(namespace, Some(self.poll_interval))
    }
}

/// Register, look once, then wait to be found.
#[derive(Clone)]
pub struct Advertise {
    rendezvous: DhtRendezvous,
}

impl Advertise {
    /// Create the strategy.
    pub fn new(rendezvous: DhtRendezvous) -> Self {
        Self { rendezvous }
    }
}

impl Discovery for Advertise {
    fn name(&self) -> &'static str {
        "advertise"
    }

    fn advertise(&self, namespace: &str, shutdown: CancellationToken) -> JoinHandle<()> {
        self.rendezvous.advertise(namespace, shutdown)
    }

    fn find_peers(&self, namespace: &str) -> PeerStream {
        self.rendezvous.lookup(namespace, None)
    }
}

/// Initial burst over the current and previous minute, then optional polling.
fn rendezvous_stream(
    publisher: RecordPublisher,
    namespace: String,
    poll: Option<Duration>,
) -> PeerStream {
    async_stream::stream! {
        let mut seen = HashSet::new();
        debug!(namespace = %namespace, "Starting DHT discovery");

        // previous minute too, records from before a minute boundary are still there
        for offset in [0i64, -1] {
            let minute = unix_minute(offset);
            for record in publisher.get_records(minute).await {
                if let Some(item) = process_record(&record, minute, &mut seen) {
                    yield item;
                }
            }
        }
        debug!(namespace = %namespace, discovered = seen.len(), "DHT discovery burst complete");

        if let Some(every) = poll {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // skip first tick, burst already queried
            interval.tick().await;
            loop {
                interval.tick().await;
                let minute = unix_minute(0);
                for record in publisher.get_records(minute).await {
                    if let Some(item) = process_record(&record, minute, &mut seen) {
                        yield item;
                    }
                }
            }
        }
    }
    .boxed()
}

fn process_record(
    record: &Record,
    minute: u64,
    seen: &mut HashSet<EndpointId>,
) -> Option<Result<PeerAddressRecord>> {
    let peer = match record.content::<PeerRecord>() {
        Ok(content) => content.into_address_record(),
        Err(e) => Err(Error::dht(format!("decode record: {e}"))),
    };
    match peer {
        Ok(peer) if seen.insert(peer.id) => {
            debug!(peer = %peer.id, minute, source = "dht", "discovered peer");
            Some(Ok(peer))
        }
        Ok(peer) => {
            trace!(peer = %peer.id, "Skipping duplicate");
            None
        }
        Err(e) => Some(Err(e)),
    }
}
