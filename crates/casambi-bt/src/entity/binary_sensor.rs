//! Binary sensors of the network device

use super::{DeviceInfo, Entity, EntityCategory};
use crate::constants::Platform;
use casambi_core::CasambiNetwork;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySensorDeviceClass {
    Connectivity,
}

/// Static description of a binary sensor
#[derive(Debug, Clone, Copy)]
pub struct BinarySensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub device_class: BinarySensorDeviceClass,
    pub entity_category: Option<EntityCategory>,
}

pub const NETWORK_SENSORS: [BinarySensorDescription; 1] = [BinarySensorDescription {
    key: "status",
    name: "Status",
    device_class: BinarySensorDeviceClass::Connectivity,
    entity_category: Some(EntityCategory::Diagnostic),
}];

pub struct CasambiBinarySensor {
    network: Arc<CasambiNetwork>,
    description: BinarySensorDescription,
}

impl CasambiBinarySensor {
    #[must_use] pub fn new(network: Arc<CasambiNetwork>, description: BinarySensorDescription) -> Self {
        Self {
            network,
            description,
        }
    }

    #[must_use] pub fn device_class(&self) -> BinarySensorDeviceClass {
        self.description.device_class
    }

    /// Connected to the network
    #[must_use] pub fn is_on(&self) -> bool {
        self.network.available()
    }
}

impl Entity for CasambiBinarySensor {
    fn platform(&self) -> Platform {
        Platform::BinarySensor
    }

    fn unique_id(&self) -> String {
        format!("{}-{}", self.network.network_id(), self.description.key)
    }

    fn name(&self) -> Option<String> {
        Some(self.description.name.to_string())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_network(&self.network)
    }

    // Reports the connection state, so it must stay readable while disconnected
    fn available(&self) -> bool {
        true
    }

    fn entity_category(&self) -> Option<EntityCategory> {
        self.description.entity_category
    }
}
