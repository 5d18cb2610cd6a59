//! Session interface of the Casambi Bluetooth library

use crate::bluetooth::BleDevice;
use crate::types::{Group, ProtocolError, Scene, SwitchEvent, Target, Unit, UnitState};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Unsolicited notifications from a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The BLE link dropped (also emitted when the session is torn down)
    Disconnected,
    /// A unit reported a new state or changed its online status
    UnitChanged(Unit),
    /// A switch button was pressed, held or released
    SwitchEvent(SwitchEvent),
}

/// One authenticated connection to a Casambi network
///
/// Implementations own framing, encryption and GATT handling. Every
/// subscriber returned by [`CasambiSession::subscribe`] sees all events
/// emitted after it subscribed; dropping the receiver unregisters it.
#[async_trait]
pub trait CasambiSession: Send + Sync {
    /// Connect and authenticate against the network behind `device`
    async fn connect(&self, device: &BleDevice, password: &str) -> Result<(), ProtocolError>;

    /// Tear down the connection
    async fn disconnect(&self) -> Result<(), ProtocolError>;

    /// Drop any cached network description for `address`
    async fn invalidate_cache(&self, address: &str) -> Result<(), ProtocolError>;

    fn connected(&self) -> bool;

    fn network_id(&self) -> String;

    fn network_name(&self) -> String;

    fn units(&self) -> Vec<Unit>;

    fn groups(&self) -> Vec<Group>;

    fn scenes(&self) -> Vec<Scene>;

    async fn set_unit_state(&self, unit: &Unit, state: &UnitState) -> Result<(), ProtocolError>;

    async fn set_level(&self, target: Target, level: u8) -> Result<(), ProtocolError>;

    async fn set_color(&self, target: Target, rgb: (u8, u8, u8)) -> Result<(), ProtocolError>;

    async fn set_white(&self, target: Target, white: u8) -> Result<(), ProtocolError>;

    async fn set_vertical(&self, target: Target, vertical: u8) -> Result<(), ProtocolError>;

    /// Restore the last non-zero level
    async fn turn_on(&self, target: Target) -> Result<(), ProtocolError>;

    async fn switch_to_scene(&self, scene: &Scene, level: u8) -> Result<(), ProtocolError>;

    /// Register for disconnect, unit-changed and switch notifications
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
