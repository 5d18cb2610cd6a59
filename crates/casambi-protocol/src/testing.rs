//! In-memory doubles for the session and host interfaces
//!
//! `MockSession` records every call it receives and lets a test script the
//! outcome of `connect`. `MockBluetoothHost` holds a set of visible addresses
//! and re-broadcasts advertisements injected by the test.

use crate::bluetooth::{Advertisement, BleDevice, BluetoothHost};
use crate::session::{CasambiSession, SessionEvent};
use crate::types::{Group, ProtocolError, Scene, SwitchEvent, Target, Unit, UnitState};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// A call received by [`MockSession`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Connect { address: String, password: String },
    Disconnect,
    InvalidateCache { address: String },
    SetUnitState { unit_id: u16, state: UnitState },
    SetLevel { target: Target, level: u8 },
    SetColor { target: Target, rgb: (u8, u8, u8) },
    SetWhite { target: Target, white: u8 },
    SetVertical { target: Target, vertical: u8 },
    TurnOn { target: Target },
    SwitchToScene { scene_id: u16, level: u8 },
}

/// Scripted connect outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Ok,
    Bluetooth,
    NetworkNotFound,
    Authentication,
    Other,
}

impl ConnectOutcome {
    fn into_result(self) -> Result<(), ProtocolError> {
        match self {
            ConnectOutcome::Ok => Ok(()),
            ConnectOutcome::Bluetooth => Err(ProtocolError::Bluetooth("adapter busy".to_string())),
            ConnectOutcome::NetworkNotFound => Err(ProtocolError::NetworkNotFound),
            ConnectOutcome::Authentication => Err(ProtocolError::Authentication),
            ConnectOutcome::Other => Err(ProtocolError::Other("unexpected".to_string())),
        }
    }
}

#[derive(Default)]
struct MockSessionState {
    calls: Vec<SessionCall>,
    connect_outcomes: VecDeque<ConnectOutcome>,
    units: Vec<Unit>,
    groups: Vec<Group>,
    scenes: Vec<Scene>,
}

/// Session double driven by the test
pub struct MockSession {
    state: Mutex<MockSessionState>,
    connected: AtomicBool,
    connect_delay: Duration,
    fail_disconnect: AtomicBool,
    network_id: String,
    network_name: String,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    #[must_use] pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockSessionState::default()),
            connected: AtomicBool::new(false),
            connect_delay: Duration::ZERO,
            fail_disconnect: AtomicBool::new(false),
            network_id: "net-1".to_string(),
            network_name: "Home".to_string(),
            event_tx,
        }
    }

    /// Make every `connect` take this long before completing
    #[must_use] pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    #[must_use] pub fn with_network(mut self, id: &str, name: &str) -> Self {
        self.network_id = id.to_string();
        self.network_name = name.to_string();
        self
    }

    #[must_use] pub fn with_units(self, units: Vec<Unit>) -> Self {
        self.lock().units = units;
        self
    }

    #[must_use] pub fn with_groups(self, groups: Vec<Group>) -> Self {
        self.lock().groups = groups;
        self
    }

    #[must_use] pub fn with_scenes(self, scenes: Vec<Scene>) -> Self {
        self.lock().scenes = scenes;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockSessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: SessionCall) {
        self.lock().calls.push(call);
    }

    /// Queue the outcome of the next `connect`; an empty queue succeeds
    pub fn push_connect_outcome(&self, outcome: ConnectOutcome) {
        self.lock().connect_outcomes.push_back(outcome);
    }

    /// Make `disconnect` fail with a Bluetooth error
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    #[must_use] pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().calls.clone()
    }

    #[must_use] pub fn connect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SessionCall::Connect { .. }))
            .count()
    }

    #[must_use] pub fn disconnect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SessionCall::Disconnect))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Simulate the link dropping without a call from our side
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(SessionEvent::Disconnected);
    }

    /// Deliver a unit update to subscribers
    pub fn emit_unit_changed(&self, unit: Unit) {
        let _ = self.event_tx.send(SessionEvent::UnitChanged(unit));
    }

    /// Deliver a switch event to subscribers
    pub fn emit_switch_event(&self, event: SwitchEvent) {
        let _ = self.event_tx.send(SessionEvent::SwitchEvent(event));
    }

    #[must_use] pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

#[async_trait]
impl CasambiSession for MockSession {
    async fn connect(&self, device: &BleDevice, password: &str) -> Result<(), ProtocolError> {
        self.record(SessionCall::Connect {
            address: device.address.clone(),
            password: password.to_string(),
        });
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let outcome = self
            .lock()
            .connect_outcomes
            .pop_front()
            .unwrap_or(ConnectOutcome::Ok);
        outcome.into_result()?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProtocolError> {
        self.record(SessionCall::Disconnect);
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            let _ = self.event_tx.send(SessionEvent::Disconnected);
        }
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ProtocolError::Bluetooth("disconnect failed".to_string()));
        }
        if !was_connected {
            return Err(ProtocolError::NotConnected);
        }
        Ok(())
    }

    async fn invalidate_cache(&self, address: &str) -> Result<(), ProtocolError> {
        self.record(SessionCall::InvalidateCache {
            address: address.to_string(),
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn network_id(&self) -> String {
        self.network_id.clone()
    }

    fn network_name(&self) -> String {
        self.network_name.clone()
    }

    fn units(&self) -> Vec<Unit> {
        self.lock().units.clone()
    }

    fn groups(&self) -> Vec<Group> {
        self.lock().groups.clone()
    }

    fn scenes(&self) -> Vec<Scene> {
        self.lock().scenes.clone()
    }

    async fn set_unit_state(&self, unit: &Unit, state: &UnitState) -> Result<(), ProtocolError> {
        self.record(SessionCall::SetUnitState {
            unit_id: unit.device_id,
            state: state.clone(),
        });
        Ok(())
    }

    async fn set_level(&self, target: Target, level: u8) -> Result<(), ProtocolError> {
        self.record(SessionCall::SetLevel { target, level });
        Ok(())
    }

    async fn set_color(&self, target: Target, rgb: (u8, u8, u8)) -> Result<(), ProtocolError> {
        self.record(SessionCall::SetColor { target, rgb });
        Ok(())
    }

    async fn set_white(&self, target: Target, white: u8) -> Result<(), ProtocolError> {
        self.record(SessionCall::SetWhite { target, white });
        Ok(())
    }

    async fn set_vertical(&self, target: Target, vertical: u8) -> Result<(), ProtocolError> {
        self.record(SessionCall::SetVertical { target, vertical });
        Ok(())
    }

    async fn turn_on(&self, target: Target) -> Result<(), ProtocolError> {
        self.record(SessionCall::TurnOn { target });
        Ok(())
    }

    async fn switch_to_scene(&self, scene: &Scene, level: u8) -> Result<(), ProtocolError> {
        self.record(SessionCall::SwitchToScene {
            scene_id: scene.scene_id,
            level,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

/// Host double with a scripted set of visible devices
pub struct MockBluetoothHost {
    present: Mutex<HashSet<String>>,
    scanners: Mutex<usize>,
    adv_tx: broadcast::Sender<Advertisement>,
}

impl Default for MockBluetoothHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBluetoothHost {
    #[must_use] pub fn new() -> Self {
        let (adv_tx, _) = broadcast::channel(64);
        Self {
            present: Mutex::new(HashSet::new()),
            scanners: Mutex::new(1),
            adv_tx,
        }
    }

    /// Make `address` resolvable (or not)
    pub fn set_present(&self, address: &str, present: bool) {
        let mut set = self.present.lock().unwrap_or_else(PoisonError::into_inner);
        if present {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn set_scanner_count(&self, count: usize) {
        *self.scanners.lock().unwrap_or_else(PoisonError::into_inner) = count;
    }

    /// Inject an advertisement from `address`
    pub fn advertise(&self, address: &str, connectable: bool) {
        let _ = self.adv_tx.send(Advertisement {
            address: address.to_string(),
            name: None,
            rssi: Some(-60),
            connectable,
            source: "hci0".to_string(),
        });
    }

    #[must_use] pub fn advertisement_subscribers(&self) -> usize {
        self.adv_tx.receiver_count()
    }
}

impl BluetoothHost for MockBluetoothHost {
    fn device_from_address(&self, address: &str, _connectable: bool) -> Option<BleDevice> {
        let set = self.present.lock().unwrap_or_else(PoisonError::into_inner);
        set.contains(address).then(|| BleDevice::new(address))
    }

    fn scanner_count(&self, _connectable: bool) -> usize {
        *self.scanners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe_advertisements(&self) -> broadcast::Receiver<Advertisement> {
        self.adv_tx.subscribe()
    }
}
