//! Error types for gossip-chat.

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Joining a gossip topic failed.
    #[error("failed to join topic '{topic}': {reason}")]
    TopicJoin {
        /// Derived topic name.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// Subscribing to a joined topic failed.
    #[error("failed to subscribe to topic '{topic}': {reason}")]
    Subscribe {
        /// Derived topic name.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// The subscription stream ended or the transport went away.
    #[error("subscription has closed")]
    SubscriptionClosed,

    /// Gossip API error.
    #[error("gossip error: {0}")]
    Gossip(#[from] iroh_gossip::api::ApiError),

    /// Chat payload could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Iroh connection error.
    #[error("Iroh error: {0}")]
    Iroh(#[from] iroh::endpoint::ConnectError),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// DHT rendezvous error.
    #[error("DHT error: {0}")]
    Dht(String),
}

impl Error {
    /// Create a connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a DHT error.
    pub fn dht<S: Into<String>>(msg: S) -> Self {
        Self::Dht(msg.into())
    }

    pub(crate) fn topic_join(topic: &str, reason: impl std::fmt::Display) -> Self {
        Self::TopicJoin {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn subscribe(topic: &str, reason: impl std::fmt::Display) -> Self {
        Self::Subscribe {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}
