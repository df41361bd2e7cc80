//! Real-time media distribution over a datagram-capable transport.
//!
//! A publisher sends timestamped objects, organized into groups and identified
//! by a URL; subscribers receive them with freshness-appropriate reliability.
//! Relay nodes cache fragments so additional subscribers pull from the nearest
//! cache; an origin is a relay with no upstream.
//!
//! The crate is the core of such a node: the per-URL fragment cache and its
//! reader state machines, reassembly, acknowledgement tracking and repeat,
//! wire framing, and the session orchestration that the transport's callbacks
//! drive. The transport itself (connections, streams, datagrams, TLS) sits
//! behind the [session::Session] callback surface.

pub mod ack;
pub mod cache;
pub mod coding;
pub mod config;
pub mod consume;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod publish;
pub mod session;

mod util;

pub use config::{Config, Role, ALPN};
pub use endpoint::Endpoint;
pub use error::Error;
pub use session::{Session, TransferMode};
