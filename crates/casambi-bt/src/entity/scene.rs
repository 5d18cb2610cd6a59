//! Scene entities

use super::{DeviceInfo, Entity};
use crate::constants::Platform;
use casambi_core::{CasambiNetwork, NetworkError};
use casambi_protocol::Scene;
use std::sync::Arc;

/// Level used when a scene is activated without a brightness
pub const DEFAULT_SCENE_LEVEL: u8 = 0xFF;

pub struct CasambiScene {
    network: Arc<CasambiNetwork>,
    scene: Scene,
}

impl CasambiScene {
    #[must_use] pub fn new(network: Arc<CasambiNetwork>, scene: Scene) -> Self {
        Self { network, scene }
    }

    #[must_use] pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub async fn activate(&self, brightness: Option<u8>) -> Result<(), NetworkError> {
        tracing::info!("Switching to scene {}", self.scene.name);
        let level = brightness.unwrap_or(DEFAULT_SCENE_LEVEL);
        self.network
            .session()
            .switch_to_scene(&self.scene, level)
            .await?;
        Ok(())
    }
}

impl Entity for CasambiScene {
    fn platform(&self) -> Platform {
        Platform::Scene
    }

    fn unique_id(&self) -> String {
        format!(
            "{}-scene-{}",
            self.network.network_id(),
            self.scene.scene_id
        )
    }

    fn name(&self) -> Option<String> {
        Some(self.scene.name.clone())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::network_ref(&self.network)
    }

    fn available(&self) -> bool {
        self.network.available()
    }
}
