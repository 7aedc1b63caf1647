//! Peer discovery over the mainline DHT.
//!
//! Two strategies are offered behind the single [`Discovery`] capability:
//!
//! - **announce**: register under the rendezvous namespace, then keep
//!   searching it (initial burst plus periodic polling),
//! - **advertise**: register under the namespace, do one lookup burst and
//!   otherwise rely on peers finding us.
//!
//! Registration goes through `distributed-topic-tracker`: every node signs
//! and publishes its own record under a topic derived from the namespace, so
//! any number of peers can meet in the same minute.
//!
//! Either way the result is a [`PeerStream`], which [`bridge`] turns into
//! connection attempts.

pub mod bridge;
pub mod publisher;
pub mod record;
mod strategy;
pub mod topic;

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;

use futures_util::Stream;
use iroh::{EndpointAddr, EndpointId, TransportAddr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use strategy::{Advertise, Announce, DhtRendezvous};

use crate::Result;

/// Default rendezvous namespace.
pub const DEFAULT_NAMESPACE: &str = "gossip-chat/lobby-v1";

/// A discovered peer and the addresses it advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddressRecord {
    /// Peer identifier.
    pub id: EndpointId,
    /// Direct addresses, possibly empty.
    pub addrs: Vec<SocketAddr>,
}

impl PeerAddressRecord {
    /// A record with no direct addresses.
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }

    /// Dialable iroh address.
    pub fn endpoint_addr(&self) -> EndpointAddr {
        EndpointAddr::from_parts(self.id, self.addrs.iter().copied().map(TransportAddr::Ip))
    }
}

/// Stream of discovered peers.
pub type PeerStream = Pin<Box<dyn Stream<Item = Result<PeerAddressRecord>> + Send>>;

/// A peer discovery strategy.
pub trait Discovery: Send + Sync + 'static {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Register this node under `namespace` until `shutdown` fires.
    fn advertise(&self, namespace: &str, shutdown: CancellationToken) -> JoinHandle<()>;

    /// Find peers registered under `namespace`.
    fn find_peers(&self, namespace: &str) -> PeerStream;
}

/// Selectable discovery strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Register and actively search.
    Announce,
    /// Register and wait to be found.
    #[default]
    Advertise,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "announce" => Ok(Self::Announce),
            "advertise" => Ok(Self::Advertise),
            other => Err(format!("unknown discovery strategy '{other}'")),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announce => f.write_str("announce"),
            Self::Advertise => f.write_str("advertise"),
        }
    }
}
