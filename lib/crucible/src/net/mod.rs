//! The networking modules in `Crucible` handle all communication between
//! clients and the store: framing, per-connection state and the readiness
//! loop that drives everything.

pub mod buffer;
pub mod connection;
pub mod endpoint;
pub mod frame;
pub mod support;
