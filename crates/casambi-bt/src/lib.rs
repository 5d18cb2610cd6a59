//! Casambi Bluetooth integration
//!
//! Maps a supervised Casambi network onto host entities, persists config
//! entries and fires switch events on the host event bus.

pub mod config;
pub mod config_flow;
pub mod constants;
pub mod entity;
pub mod error;
pub mod events;
pub mod integration;
pub mod persistence;
pub mod setup;

pub use config::{ConfigEntry, EntryData, EntryStore};
pub use config_flow::{AbortReason, ConfigFlow, FlowError, FlowResult, FlowStep, UserInput};
pub use constants::*;
pub use error::{IntegrationError, SetupError};
pub use events::{EventBus, HostEvent};
pub use integration::{CasambiIntegration, SessionFactory};
pub use setup::{setup_entry, unload_entry, LoadedEntry};
