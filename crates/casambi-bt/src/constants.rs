//! Integration constants

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DOMAIN: &str = "casambi_bt";

/// Event type fired on the host bus for every switch event
pub const SWITCH_EVENT: &str = "casambi_bt_switch_event";

/// Event type fired when an entity's state should be re-read
pub const STATE_CHANGED_EVENT: &str = "state_changed";

pub const CONF_ADDRESS: &str = "address";
pub const CONF_PASSWORD: &str = "password";
pub const CONF_IMPORT_GROUPS: &str = "import_groups";

pub const MANUFACTURER: &str = "Casambi";

/// Connection type used in device info for Bluetooth connections
pub const CONNECTION_BLUETOOTH: &str = "bluetooth";

/// Host platforms the integration provides entities for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Light,
    Number,
    Scene,
}

impl Platform {
    #[must_use] pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Light => "light",
            Platform::Number => "number",
            Platform::Scene => "scene",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PLATFORMS: [Platform; 4] = [
    Platform::BinarySensor,
    Platform::Light,
    Platform::Number,
    Platform::Scene,
];
