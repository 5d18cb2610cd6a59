//! Casambi protocol seam
//!
//! This crate describes the surface of the external Casambi Bluetooth library:
//! the objects it reports (units, groups, scenes, switch events), the errors it
//! raises and the session/host traits the rest of the workspace is written
//! against. Framing, encryption and GATT handling live behind
//! [`CasambiSession`] implementations and are not part of this crate.

pub mod bluetooth;
pub mod session;
pub mod testing;
pub mod types;

pub use bluetooth::{format_mac, Advertisement, BleDevice, BluetoothHost};
pub use session::{CasambiSession, SessionEvent};
pub use types::*;
