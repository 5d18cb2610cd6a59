//! Host Bluetooth stack interface

use tokio::sync::broadcast;

/// A BLE peripheral resolved by the host scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl BleDevice {
    #[must_use] pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi: None,
        }
    }
}

/// An advertisement seen by one of the host scanners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub connectable: bool,
    /// Scanner that saw the advertisement
    pub source: String,
}

/// The host's Bluetooth manager
pub trait BluetoothHost: Send + Sync {
    /// Resolve a device the host has recently seen
    fn device_from_address(&self, address: &str, connectable: bool) -> Option<BleDevice>;

    /// Number of scanners currently available
    fn scanner_count(&self, connectable: bool) -> usize;

    /// Stream of advertisements from all scanners
    fn subscribe_advertisements(&self) -> broadcast::Receiver<Advertisement>;
}

/// Normalize a MAC address to colon separated pairs
///
/// Inputs that do not contain exactly twelve hex digits are returned unchanged.
#[must_use] pub fn format_mac(mac: &str) -> String {
    let digits: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return mac.to_string();
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).to_lowercase())
        .collect::<Vec<_>>()
        .join(":")
}
