//! Command-line configuration and tracing setup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use iroh::SecretKey;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::discovery::{Strategy, DEFAULT_NAMESPACE};
use crate::{Error, Result};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "gossip-chat",
    about = "Decentralized terminal chat over iroh gossip"
)]
pub struct Args {
    /// Display name. Empty means "New-user".
    #[clap(long, default_value = "")]
    pub user: String,

    /// Room to join. Empty means "lobby".
    #[clap(long, default_value = "")]
    pub room: String,

    /// Peer discovery strategy: announce or advertise.
    #[clap(long, default_value = "advertise")]
    pub discover: String,

    /// Log level: error, warn, info, debug or trace. RUST_LOG takes precedence.
    #[clap(long, default_value = "info")]
    pub log: String,

    /// Write logs to this file instead of stderr.
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// DHT rendezvous namespace.
    #[clap(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Hex-encoded secret key for a stable node id.
    #[clap(long)]
    pub secret_key: Option<String>,

    /// Disable relay servers.
    #[clap(long)]
    pub no_relay: bool,

    /// Seconds to wait for discovery before starting the UI.
    #[clap(long, default_value_t = 5)]
    pub settle_secs: u64,

    /// Seconds between DHT lookups in announce mode.
    #[clap(long, default_value_t = 60)]
    pub poll_secs: u64,

    /// Seconds between peer list refreshes. 0 disables.
    #[clap(long, default_value_t = 1)]
    pub refresh_secs: u64,
}

/// Resolved, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Display name as given.
    pub user: String,
    /// Room as given.
    pub room: String,
    /// Discovery strategy.
    pub strategy: Strategy,
    /// Default log level.
    pub log_level: LevelFilter,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
    /// DHT rendezvous namespace.
    pub namespace: String,
    /// Node identity, random if absent.
    pub secret_key: Option<SecretKey>,
    /// Whether relay servers are used.
    pub relay: bool,
    /// Delay before the UI starts.
    pub settle: Duration,
    /// Announce-mode poll interval.
    pub poll_interval: Duration,
    /// Peer panel refresh interval.
    pub refresh: Option<Duration>,
    /// Problems found while resolving arguments, to be logged once tracing
    /// is running.
    pub warnings: Vec<String>,
}

impl TryFrom<Args> for Config {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self> {
        let mut warnings = Vec::new();

        let strategy = args.discover.parse().unwrap_or_else(|e| {
            warnings.push(format!("{e}, using {}", Strategy::default()));
            Strategy::default()
        });

        let log_level = parse_level(&args.log).unwrap_or_else(|| {
            warnings.push(format!("unknown log level '{}', using info", args.log));
            LevelFilter::INFO
        });

        let secret_key = args
            .secret_key
            .as_deref()
            .map(SecretKey::from_str)
            .transpose()
            .map_err(|e| Error::config(format!("invalid secret key: {e}")))?;

        if args.poll_secs == 0 {
            return Err(Error::config("poll interval must be at least one second"));
        }

        Ok(Self {
            user: args.user,
            room: args.room,
            strategy,
            log_level,
            log_file: args.log_file,
            namespace: args.namespace,
            secret_key,
            relay: !args.no_relay,
            settle: Duration::from_secs(args.settle_secs),
            poll_interval: Duration::from_secs(args.poll_secs),
            refresh: (args.refresh_secs > 0).then(|| Duration::from_secs(args.refresh_secs)),
            warnings,
        })
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        // logrus-style names map onto the closest tracing level
        "panic" | "fatal" | "error" => Some(LevelFilter::ERROR),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

/// Build the filter used when `RUST_LOG` is not set.
///
/// Networking crates are held at `warn` unless debugging.
pub fn default_filter(level: LevelFilter) -> EnvFilter {
    if level >= LevelFilter::DEBUG {
        EnvFilter::new(level.to_string())
    } else {
        EnvFilter::new(format!(
            "{level},iroh=warn,iroh_gossip=warn,mainline=warn,distributed_topic_tracker=warn"
        ))
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e)),
    }
}
