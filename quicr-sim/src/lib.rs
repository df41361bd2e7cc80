//! Deterministic in-process substrate for `quicr-transport`.
//!
//! Replaces the QUIC stack in tests and demos: virtual microsecond time,
//! point-to-point links with latency, bandwidth and a rotating datagram loss
//! mask, and per-datagram ack/loss callbacks, all driven from one event queue
//! so every run is reproducible. Also provides the test media codec: a
//! deterministic object generator and a matching verifier.

mod link;
mod media;
mod net;

pub use link::*;
pub use media::*;
pub use net::*;
