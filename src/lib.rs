//! smallchat - a minimal multi-client line broadcast chat.
//!
//! Clients connect over TCP and type lines of text. Every line is relayed to
//! all other connected clients, prefixed with the sender's nickname. Lines
//! starting with `/` are commands; `/nick <name>` is the only one understood.
//!
//! The server is a single-threaded reactor: one [`ChatServer`] owns the
//! listening socket and the [`ClientRegistry`] and drives both from
//! [`ChatServer::run`]. There is no outbound buffering: broadcasts are a
//! single best-effort write per peer.

pub mod broadcast;
pub(crate) mod client;
pub mod config;
pub mod dispatch;
pub(crate) mod error;
pub mod framing;
pub mod registry;
pub(crate) mod server;
pub mod terminal;

// These are the intended public API
pub use client::{ChatClient, ClientExit};
pub use crate::config::{ClientConfig, ServerConfig};
pub use dispatch::{Dispatcher, Outcome};
pub use error::Error;
pub use framing::Framing;
pub use registry::{ClientRegistry, Handle, Peer};
pub use server::{ChatServer, ServerInterface};

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::client::{ChatClient, ClientExit};
    pub use crate::config::{ClientConfig, ServerConfig};
    pub use crate::error::Error;
    pub use crate::framing::Framing;
    pub use crate::server::{ChatServer, ServerInterface};
}
