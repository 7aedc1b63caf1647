//! Node setup: one iroh endpoint with gossip mounted on its router.

use async_trait::async_trait;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointId, RelayMode, SecretKey};
use iroh_gossip::net::Gossip;
use tracing::{debug, info};

use crate::discovery::PeerAddressRecord;
use crate::error::{Error, Result};
use crate::gossip::{IrohPubSub, KnownPeers};
use crate::net::Host;

/// Builder for a chat node.
#[derive(Debug)]
pub struct TransportBuilder {
    endpoint: Option<Endpoint>,
    secret_key: Option<SecretKey>,
    relay: bool,
}

impl TransportBuilder {
    /// Create a builder with a random identity and relays enabled.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            secret_key: None,
            relay: true,
        }
    }

    /// Use an already bound endpoint. Identity and relay settings are then
    /// ignored.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Use a fixed identity.
    pub fn secret_key(mut self, key: Option<SecretKey>) -> Self {
        self.secret_key = key;
        self
    }

    /// Enable or disable relay servers.
    pub fn relay(mut self, enabled: bool) -> Self {
        self.relay = enabled;
        self
    }

    /// Bind the endpoint and start gossip.
    pub async fn spawn(self) -> Result<TransportGuard> {
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => {
                let mut builder = Endpoint::builder();
                if let Some(key) = self.secret_key {
                    builder = builder.secret_key(key);
                }
                if !self.relay {
                    builder = builder.relay_mode(RelayMode::Disabled);
                }
                builder
                    .bind()
                    .await
                    .map_err(|e| Error::connection(format!("failed to bind endpoint: {e}")))?
            }
        };

        let gossip = Gossip::builder().spawn(endpoint.clone());
        let router = Router::builder(endpoint.clone())
            .accept(iroh_gossip::ALPN, gossip.clone())
            .spawn();

        info!(id = %endpoint.id(), "node started");

        Ok(TransportGuard {
            endpoint,
            router,
            gossip,
            peers: KnownPeers::new(),
        })
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running node.
pub struct TransportGuard {
    endpoint: Endpoint,
    router: Router,
    gossip: Gossip,
    peers: KnownPeers,
}

impl TransportGuard {
    /// Access the endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Gossip router for chat rooms.
    pub fn pubsub(&self) -> IrohPubSub {
        IrohPubSub::new(self.gossip.clone(), self.endpoint.id(), self.peers.clone())
    }

    /// Graceful shutdown of gossip and the router.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.router.shutdown().await {
            tracing::warn!("router shutdown error: {e}");
        }
        info!("node stopped");
        Ok(())
    }
}

#[async_trait]
impl Host for TransportGuard {
    fn id(&self) -> EndpointId {
        self.endpoint.id()
    }

    async fn connect(&self, peer: PeerAddressRecord) -> Result<()> {
        let id = peer.id;
        let conn = self
            .endpoint
            .connect(peer.endpoint_addr(), iroh_gossip::ALPN)
            .await?;
        debug!(peer = %id.fmt_short(), "peer reachable");
        // gossip dials on its own once the peer is known
        drop(conn);
        if self.peers.insert(id) {
            debug!(peer = %id.fmt_short(), "added to known peers");
        }
        Ok(())
    }
}
