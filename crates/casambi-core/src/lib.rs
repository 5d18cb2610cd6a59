//! Casambi network management
//!
//! This crate supervises one Casambi session on top of the protocol seam:
//! connection and reconnection, unit update subscriptions and deduplicated
//! switch event fan-out.

pub mod config;
pub mod dedup;
pub mod error;
pub mod listeners;
pub mod network;

pub use config::NetworkConfig;
pub use dedup::{DedupKey, DedupOutcome, EventDeduplicator};
pub use error::NetworkError;
pub use listeners::{ListenerId, SwitchEventCallback, UnitCallback};
pub use network::CasambiNetwork;
