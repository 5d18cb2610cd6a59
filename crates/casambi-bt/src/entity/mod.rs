//! Host entities backed by a Casambi network

pub mod binary_sensor;
pub mod light;
pub mod number;
pub mod scene;

use crate::constants::{Platform, CONNECTION_BLUETOOTH, DOMAIN, MANUFACTURER};
use crate::events::EventBus;
use casambi_core::{CasambiNetwork, ListenerId, NetworkError, UnitCallback};
use casambi_protocol::Unit;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub use binary_sensor::CasambiBinarySensor;
pub use light::{CasambiLightGroup, CasambiLightUnit, ColorMode, LightEntity, TurnOnParams};
pub use number::{CasambiVerticalNumberGroup, CasambiVerticalNumberUnit, NumberEntity};
pub use scene::CasambiScene;

/// Device registry information of an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    /// (domain, id) pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<(String, String)>,
    /// (connection type, id) pairs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<(String, String)>,
}

impl DeviceInfo {
    /// A physical unit, attached to the network device
    #[must_use] pub fn for_unit(network: &CasambiNetwork, unit: &Unit) -> Self {
        Self {
            name: Some(unit.name.clone()),
            manufacturer: Some(unit.unit_type.manufacturer.clone()),
            model: Some(unit.unit_type.model.clone()),
            sw_version: unit.firmware_version.clone(),
            identifiers: vec![(DOMAIN.to_string(), unit.uuid.clone())],
            via_device: Some((DOMAIN.to_string(), network.network_id())),
            connections: Vec::new(),
        }
    }

    /// The network itself
    #[must_use] pub fn for_network(network: &CasambiNetwork) -> Self {
        Self {
            name: Some(network.network_name()),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some("Network".to_string()),
            sw_version: None,
            identifiers: vec![(DOMAIN.to_string(), network.network_id())],
            via_device: None,
            connections: vec![(CONNECTION_BLUETOOTH.to_string(), network.address().to_string())],
        }
    }

    /// Reference to the network device by identifier only
    #[must_use] pub fn network_ref(network: &CasambiNetwork) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), network.network_id())],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Diagnostic,
}

/// Common surface of all entities
pub trait Entity: Send + Sync {
    fn platform(&self) -> Platform;

    fn unique_id(&self) -> String;

    /// `None` means the entity takes its device's name
    fn name(&self) -> Option<String>;

    fn device_info(&self) -> DeviceInfo;

    fn available(&self) -> bool;

    fn entity_category(&self) -> Option<EntityCategory> {
        None
    }

    /// Called once the host tracks the entity
    fn added_to_host(&self) {}

    /// Called before the host drops the entity
    fn will_remove_from_host(&self) -> Result<(), NetworkError> {
        Ok(())
    }
}

fn apply_unit_update(own: &mut Unit, update: &Unit) {
    if update.state.is_some() {
        *own = update.clone();
    } else {
        // Updates without state come from offline units
        own.online = update.online;
    }
}

/// Shared snapshot of one unit
#[derive(Clone)]
pub(crate) struct UnitCell(Arc<RwLock<Unit>>);

impl UnitCell {
    pub(crate) fn new(unit: Unit) -> Self {
        Self(Arc::new(RwLock::new(unit)))
    }

    pub(crate) fn get(&self) -> Unit {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn apply(&self, update: &Unit) {
        let mut own = self.0.write().unwrap_or_else(PoisonError::into_inner);
        apply_unit_update(&mut own, update);
    }
}

/// Shared snapshots of the members of a group, in group order
#[derive(Clone)]
pub(crate) struct MemberCells(Arc<RwLock<Vec<Unit>>>);

impl MemberCells {
    pub(crate) fn new(units: Vec<Unit>) -> Self {
        Self(Arc::new(RwLock::new(units)))
    }

    pub(crate) fn get(&self) -> Vec<Unit> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn apply(&self, update: &Unit) {
        let mut units = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(own) = units.iter_mut().find(|u| u.device_id == update.device_id) {
            apply_unit_update(own, update);
        }
    }
}

/// Callback storing updates in `cell` and notifying the host
pub(crate) fn unit_callback(
    cell: UnitCell,
    bus: EventBus,
    platform: Platform,
    unique_id: String,
) -> UnitCallback {
    Arc::new(move |unit: &Unit| {
        tracing::debug!("Handling state change for unit {}", unit.device_id);
        cell.apply(unit);
        bus.fire_state_changed(platform, &unique_id);
    })
}

/// Callback storing member updates in `cells` and notifying the host
pub(crate) fn member_callback(
    cells: MemberCells,
    bus: EventBus,
    group_id: u16,
    platform: Platform,
    unique_id: String,
) -> UnitCallback {
    Arc::new(move |unit: &Unit| {
        tracing::debug!(
            "Handling state change for unit {} in group {}",
            unit.device_id,
            group_id
        );
        cells.apply(unit);
        bus.fire_state_changed(platform, &unique_id);
    })
}

/// Unit update registrations owned by an entity
#[derive(Default)]
pub(crate) struct Subscriptions(Mutex<Vec<(Unit, ListenerId)>>);

impl Subscriptions {
    pub(crate) fn subscribe(&self, network: &CasambiNetwork, unit: &Unit, callback: UnitCallback) {
        let id = network.register_unit_updates(unit, callback);
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((unit.clone(), id));
    }

    /// Drop every registration, returning the first failure
    pub(crate) fn unsubscribe_all(&self, network: &CasambiNetwork) -> Result<(), NetworkError> {
        let registrations =
            std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));

        let mut result = Ok(());
        for (unit, id) in registrations {
            if let Err(e) = network.unregister_unit_updates(&unit, id) {
                tracing::warn!("Failed to unsubscribe from unit {}: {}", unit.device_id, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
