//! Setup and unload of a single config entry

use crate::config::ConfigEntry;
use crate::entity::light::LIGHT_CONTROL_TYPES;
use crate::entity::number::group_has_vertical;
use crate::entity::{
    binary_sensor::NETWORK_SENSORS, CasambiBinarySensor, CasambiLightGroup, CasambiLightUnit,
    CasambiScene, CasambiVerticalNumberGroup, CasambiVerticalNumberUnit, Entity, LightEntity,
    NumberEntity,
};
use crate::error::{IntegrationError, SetupError};
use crate::events::EventBus;
use casambi_core::{CasambiNetwork, ListenerId, NetworkConfig, SwitchEventCallback};
use casambi_protocol::{BluetoothHost, CasambiSession, UnitControlType};
use std::sync::Arc;

/// Entities created for one entry, grouped by platform
#[derive(Default)]
pub struct Entities {
    pub binary_sensors: Vec<Arc<CasambiBinarySensor>>,
    pub lights: Vec<Arc<dyn LightEntity>>,
    pub numbers: Vec<Arc<dyn NumberEntity>>,
    pub scenes: Vec<Arc<CasambiScene>>,
    all: Vec<Arc<dyn Entity>>,
}

impl Entities {
    /// Create the entities of every platform for a connected network
    pub fn create(network: &Arc<CasambiNetwork>, bus: &EventBus, import_groups: bool) -> Self {
        let mut entities = Self::default();

        for description in NETWORK_SENSORS {
            let sensor = Arc::new(CasambiBinarySensor::new(Arc::clone(network), description));
            entities.binary_sensors.push(Arc::clone(&sensor));
            entities.all.push(sensor);
        }

        for unit in network.units(&LIGHT_CONTROL_TYPES) {
            let light = Arc::new(CasambiLightUnit::new(Arc::clone(network), bus.clone(), unit));
            entities.lights.push(light.clone());
            entities.all.push(light);
        }

        for unit in network.units(&[UnitControlType::Vertical]) {
            let number = Arc::new(CasambiVerticalNumberUnit::new(
                Arc::clone(network),
                bus.clone(),
                unit,
            ));
            entities.numbers.push(number.clone());
            entities.all.push(number);
        }

        if import_groups {
            for group in network.groups() {
                if group_has_vertical(&group) {
                    let number = Arc::new(CasambiVerticalNumberGroup::new(
                        Arc::clone(network),
                        bus.clone(),
                        group.clone(),
                    ));
                    entities.numbers.push(number.clone());
                    entities.all.push(number);
                }

                let light = Arc::new(CasambiLightGroup::new(Arc::clone(network), bus.clone(), group));
                entities.lights.push(light.clone());
                entities.all.push(light);
            }
        }

        for scene in network.scenes() {
            let scene = Arc::new(CasambiScene::new(Arc::clone(network), scene));
            entities.scenes.push(Arc::clone(&scene));
            entities.all.push(scene);
        }

        entities
    }

    /// Every entity regardless of platform
    #[must_use] pub fn all(&self) -> &[Arc<dyn Entity>] {
        &self.all
    }

    #[must_use] pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    fn added_to_host(&self) {
        for entity in &self.all {
            entity.added_to_host();
        }
    }

    fn will_remove_from_host(&self) -> Result<(), IntegrationError> {
        let mut result = Ok(());
        for entity in &self.all {
            if let Err(e) = entity.will_remove_from_host() {
                tracing::warn!("Failed to remove entity {}: {}", entity.unique_id(), e);
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }
}

/// A set up config entry
pub struct LoadedEntry {
    pub entry: ConfigEntry,
    pub network: Arc<CasambiNetwork>,
    pub entities: Entities,
    switch_listener: ListenerId,
}

/// Connect to the entry's network and create its entities
pub async fn setup_entry(
    entry: &ConfigEntry,
    session: Arc<dyn CasambiSession>,
    host: Arc<dyn BluetoothHost>,
    bus: &EventBus,
    config: NetworkConfig,
) -> Result<LoadedEntry, SetupError> {
    let network = Arc::new(CasambiNetwork::new(
        entry.data.address.clone(),
        entry.data.password.clone(),
        session,
        host,
        config,
    ));

    if let Err(e) = network.connect().await {
        tracing::warn!("Setup of {} failed: {}", entry.title, e);
        return Err(SetupError::from(e));
    }

    tracing::info!(
        "Switch event deduplication enabled with {}s window",
        config.dedup_window.as_secs()
    );
    let switch_listener = {
        let bus = bus.clone();
        let entry_id = entry.entry_id.clone();
        network.register_switch_event_callback(SwitchEventCallback::sync(move |event| {
            bus.fire_switch_event(&entry_id, event);
        }))
    };

    let entities = Entities::create(&network, bus, entry.data.import_groups);
    entities.added_to_host();
    tracing::info!(
        "Set up {} entities for Casambi network '{}'",
        entities.len(),
        network.network_name()
    );

    Ok(LoadedEntry {
        entry: entry.clone(),
        network,
        entities,
        switch_listener,
    })
}

/// Remove the entry's entities and disconnect
pub async fn unload_entry(loaded: LoadedEntry) -> Result<(), IntegrationError> {
    let removed = loaded.entities.will_remove_from_host();
    loaded
        .network
        .unregister_switch_event_callback(loaded.switch_listener);
    loaded.network.disconnect().await;

    tracing::info!("Unloaded config entry {}", loaded.entry.title);
    removed
}
