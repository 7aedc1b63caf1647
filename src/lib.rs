//! Decentralized chat rooms over iroh gossip, with peers found through the
//! mainline DHT.
//!
//! A [`ChatRoom`] maps a room name onto a gossip topic and exposes it as
//! plain channels. [`discovery`] finds peers and [`discovery::bridge`] turns
//! them into connections. [`ui::Ui`] drives a terminal session.

#![deny(missing_docs)]

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gossip;
pub mod message;
pub mod net;
pub mod room;
pub mod transport;
pub mod ui;

// Re-export key types
pub use error::{Error, Result};
pub use message::{ChatLog, ChatMessage};
pub use room::ChatRoom;
pub use transport::{TransportBuilder, TransportGuard};
