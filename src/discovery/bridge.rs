//! Turns a discovery stream into connection attempts.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::PeerStream;
use crate::net::Host;

/// Spawn a task that connects `host` to every peer yielded by `peers`.
pub fn spawn<H: Host>(
    host: Arc<H>,
    peers: PeerStream,
    shutdown: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(run(host, peers, shutdown))
}

/// Drain `peers` until it ends or `shutdown` fires.
///
/// Records for the local node are skipped. Every other record gets a
/// detached connection attempt that outlives `shutdown`; failures are logged.
/// Returns the number of attempts started.
pub async fn run<H: Host>(
    host: Arc<H>,
    mut peers: PeerStream,
    shutdown: CancellationToken,
) -> usize {
    let local_id = host.id();
    let mut attempts = 0;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = peers.next() => next,
        };

        let peer = match next {
            Some(Ok(peer)) => peer,
            Some(Err(e)) => {
                debug!(error = %e, "discovery entry skipped");
                continue;
            }
            None => break,
        };

        if peer.id == local_id {
            trace!("Skipping self in discovery");
            continue;
        }

        attempts += 1;
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            let id = peer.id;
            match host.connect(peer).await {
                Ok(()) => info!(peer = %id, "connected to discovered peer"),
                Err(e) => warn!(peer = %id, error = %e, "failed to connect to discovered peer"),
            }
        });
    }

    debug!(attempts, "discovery bridge finished");
    attempts
}
