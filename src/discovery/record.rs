//! Peer record stored in the DHT.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use iroh::EndpointId;
use serde::{Deserialize, Serialize};

use super::PeerAddressRecord;
use crate::{Error, Result};

/// Content stored in DHT records for rendezvous.
///
/// The tracker serializes it and signs the record with the node's own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The iroh endpoint id bytes (32 bytes).
    pub node_id: [u8; 32],
    /// Direct addresses the node was reachable on when it published.
    pub addrs: Vec<SocketAddr>,
    /// Unix timestamp when published.
    pub published_at: u64,
}

impl PeerRecord {
    /// Create a record for the given endpoint, stamped with the current time.
    pub fn new(endpoint_id: EndpointId, addrs: Vec<SocketAddr>) -> Self {
        let published_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            node_id: *endpoint_id.as_bytes(),
            addrs,
            published_at,
        }
    }

    /// Convert into the address record handed to the connect bridge.
    pub fn into_address_record(self) -> Result<PeerAddressRecord> {
        let id = EndpointId::from_bytes(&self.node_id)
            .map_err(|e| Error::dht(format!("invalid node id in record: {e}")))?;
        Ok(PeerAddressRecord {
            id,
            addrs: self.addrs,
        })
    }
}
