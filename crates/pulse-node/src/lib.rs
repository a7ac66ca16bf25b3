//! Heartbeat reporting for pulse nodes.
//!
//! A [`HeartbeatService`] keeps one outbound libp2p stream open to an
//! aggregator and writes a [`pulse_protocol::Heartbeat`] on it every beat
//! period, reconnecting on a slower cadence whenever a write fails.

pub mod config;
pub mod connection;
pub mod error;
pub mod head;
pub mod host;
pub mod network;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{HeartbeatConfig, HeartbeatSettings};
pub use error::HeartbeatError;
pub use head::{HeadSnapshot, HeadSource};
pub use host::{DialTarget, StreamHost};
pub use network::{build_swarm, SwarmHost};
pub use scheduler::LinkState;
pub use service::HeartbeatService;
