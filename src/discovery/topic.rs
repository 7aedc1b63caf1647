//! Rendezvous topic and secret derivation from a namespace.

use distributed_topic_tracker::TopicId;
use sha2::{Digest, Sha256};

/// Derive the tracker topic for a namespace.
///
/// `TopicId::new` hashes the string itself, so any namespace works.
pub fn topic_from_namespace(namespace: &str) -> TopicId {
    TopicId::new(namespace.to_string())
}

/// Derive the shared record secret for a namespace (SHA256 hash).
///
/// Anyone who knows the namespace can compute it. It keeps records out of
/// sight of DHT nodes that do not.
pub fn secret_from_namespace(namespace: &str) -> Vec<u8> {
    Sha256::digest(namespace.as_bytes()).to_vec()
}
