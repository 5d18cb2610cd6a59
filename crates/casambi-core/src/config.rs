//! Supervisor tuning

use std::time::Duration;

/// Delay between an unsolicited disconnect and the reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Window in which a repeated switch event is suppressed
pub const DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Timing parameters of a [`crate::CasambiNetwork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub reconnect_delay: Duration,
    pub dedup_window: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            dedup_window: DEDUP_WINDOW,
        }
    }
}
