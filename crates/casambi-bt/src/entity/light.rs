//! Light entities for units and groups

use super::{
    member_callback, unit_callback, DeviceInfo, Entity, MemberCells, Subscriptions, UnitCell,
};
use crate::constants::Platform;
use crate::events::EventBus;
use async_trait::async_trait;
use casambi_core::{CasambiNetwork, NetworkError};
use casambi_protocol::{Group, Target, Unit, UnitControlType};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Units with any of these controls become lights
pub const LIGHT_CONTROL_TYPES: [UnitControlType; 3] = [
    UnitControlType::Dimmer,
    UnitControlType::Rgb,
    UnitControlType::White,
];

/// Color modes a light can operate in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Unknown,
    Onoff,
    Brightness,
    ColorTemp,
    Xy,
    Rgb,
    Rgbw,
}

/// Color modes supported by a unit, derived from its controls
#[must_use] pub fn capabilities(unit: &Unit) -> BTreeSet<ColorMode> {
    let mut supported = BTreeSet::new();

    if unit.has_control(UnitControlType::Rgb) && unit.has_control(UnitControlType::White) {
        supported.insert(ColorMode::Rgbw);
    } else if unit.has_control(UnitControlType::Rgb) {
        supported.insert(ColorMode::Rgb);
    }
    if unit.has_control(UnitControlType::Xy) {
        supported.insert(ColorMode::Xy);
    }
    if unit.has_control(UnitControlType::Dimmer) {
        supported.insert(ColorMode::Brightness);
        supported.insert(ColorMode::Onoff);
    } else if unit.has_control(UnitControlType::OnOff) {
        supported.insert(ColorMode::Onoff);
    }
    if unit.has_control(UnitControlType::Temperature) {
        supported.insert(ColorMode::ColorTemp);
    }

    if supported.is_empty() {
        supported.insert(ColorMode::Unknown);
    }
    supported
}

/// The mode reported as current for a set of supported modes
#[must_use] pub fn mode_helper(modes: &BTreeSet<ColorMode>) -> ColorMode {
    [
        ColorMode::Rgbw,
        ColorMode::Rgb,
        ColorMode::Xy,
        ColorMode::ColorTemp,
        ColorMode::Brightness,
        ColorMode::Onoff,
    ]
    .into_iter()
    .find(|mode| modes.contains(mode))
    .unwrap_or(ColorMode::Unknown)
}

/// Optional attributes of a turn-on request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOnParams {
    pub brightness: Option<u8>,
    pub rgb: Option<(u8, u8, u8)>,
    pub rgbw: Option<(u8, u8, u8, u8)>,
    pub color_temp_kelvin: Option<u32>,
    pub xy: Option<(f32, f32)>,
}

/// Light surface exposed to the host
#[async_trait]
pub trait LightEntity: Entity {
    fn supported_color_modes(&self) -> &BTreeSet<ColorMode>;

    fn color_mode(&self) -> ColorMode {
        mode_helper(self.supported_color_modes())
    }

    fn is_on(&self) -> bool;

    fn brightness(&self) -> Option<u8>;

    fn rgb_color(&self) -> Option<(u8, u8, u8)>;

    fn rgbw_color(&self) -> Option<(u8, u8, u8, u8)>;

    async fn turn_on(&self, params: TurnOnParams) -> Result<(), NetworkError>;

    async fn turn_off(&self) -> Result<(), NetworkError>;
}

/// A single unit as a light
pub struct CasambiLightUnit {
    network: Arc<CasambiNetwork>,
    bus: EventBus,
    unit: UnitCell,
    supported: BTreeSet<ColorMode>,
    min_color_temp_kelvin: Option<u32>,
    max_color_temp_kelvin: Option<u32>,
    subscriptions: Subscriptions,
}

impl CasambiLightUnit {
    pub fn new(network: Arc<CasambiNetwork>, bus: EventBus, unit: Unit) -> Self {
        let temperature = unit.unit_type.get_control(UnitControlType::Temperature);
        let min_color_temp_kelvin = temperature.and_then(|c| c.min);
        let max_color_temp_kelvin = temperature.and_then(|c| c.max);

        Self {
            network,
            bus,
            supported: capabilities(&unit),
            unit: UnitCell::new(unit),
            min_color_temp_kelvin,
            max_color_temp_kelvin,
            subscriptions: Subscriptions::default(),
        }
    }

    /// Current unit snapshot
    #[must_use] pub fn unit(&self) -> Unit {
        self.unit.get()
    }

    #[must_use] pub fn color_temp_kelvin(&self) -> Option<u32> {
        self.unit.get().state.and_then(|s| s.temperature)
    }

    #[must_use] pub fn min_color_temp_kelvin(&self) -> Option<u32> {
        self.min_color_temp_kelvin
    }

    #[must_use] pub fn max_color_temp_kelvin(&self) -> Option<u32> {
        self.max_color_temp_kelvin
    }

    #[must_use] pub fn xy_color(&self) -> Option<(f32, f32)> {
        self.unit.get().state.and_then(|s| s.xy)
    }
}

impl Entity for CasambiLightUnit {
    fn platform(&self) -> Platform {
        Platform::Light
    }

    fn unique_id(&self) -> String {
        format!(
            "{}-unit-{}-light",
            self.network.network_id(),
            self.unit.get().uuid
        )
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_unit(&self.network, &self.unit.get())
    }

    fn available(&self) -> bool {
        self.network.available() && self.unit.get().online
    }

    fn added_to_host(&self) {
        let unit = self.unit.get();
        let callback = unit_callback(
            self.unit.clone(),
            self.bus.clone(),
            self.platform(),
            self.unique_id(),
        );
        self.subscriptions.subscribe(&self.network, &unit, callback);
    }

    fn will_remove_from_host(&self) -> Result<(), NetworkError> {
        self.subscriptions.unsubscribe_all(&self.network)
    }
}

#[async_trait]
impl LightEntity for CasambiLightUnit {
    fn supported_color_modes(&self) -> &BTreeSet<ColorMode> {
        &self.supported
    }

    fn is_on(&self) -> bool {
        self.unit.get().is_on()
    }

    fn brightness(&self) -> Option<u8> {
        self.unit.get().state.and_then(|s| s.dimmer)
    }

    fn rgb_color(&self) -> Option<(u8, u8, u8)> {
        self.unit.get().state.and_then(|s| s.rgb)
    }

    fn rgbw_color(&self) -> Option<(u8, u8, u8, u8)> {
        let state = self.unit.get().state?;
        let (r, g, b) = state.rgb?;
        Some((r, g, b, state.white?))
    }

    async fn turn_on(&self, params: TurnOnParams) -> Result<(), NetworkError> {
        let unit = self.unit.get();
        let mut state = unit.state.clone().unwrap_or_default();

        // The host sends at most one color attribute, possibly with a brightness
        let mut set_state = false;
        if let Some(brightness) = params.brightness {
            state.dimmer = Some(brightness);
            set_state = true;
        }
        if let Some((r, g, b, w)) = params.rgbw {
            state.rgb = Some((r, g, b));
            state.white = Some(w);
            set_state = true;
        }
        if let Some(rgb) = params.rgb {
            state.rgb = Some(rgb);
            set_state = true;
        }
        if let Some(kelvin) = params.color_temp_kelvin {
            state.temperature = Some(kelvin);
            set_state = true;
        }
        if let Some(xy) = params.xy {
            state.xy = Some(xy);
            set_state = true;
        }

        let session = self.network.session();
        if set_state {
            session.set_unit_state(&unit, &state).await?;
        } else {
            session.turn_on(Target::from(&unit)).await?;
        }
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), NetworkError> {
        let target = Target::from(&self.unit.get());
        self.network.session().set_level(target, 0).await?;
        Ok(())
    }
}

/// A group of units as one light
pub struct CasambiLightGroup {
    network: Arc<CasambiNetwork>,
    bus: EventBus,
    group_id: u16,
    name: String,
    members: MemberCells,
    supported: BTreeSet<ColorMode>,
    subscriptions: Subscriptions,
}

impl CasambiLightGroup {
    pub fn new(network: Arc<CasambiNetwork>, bus: EventBus, group: Group) -> Self {
        let mut supported: BTreeSet<ColorMode> = group
            .units
            .iter()
            .flat_map(capabilities)
            .filter(|mode| *mode != ColorMode::Unknown)
            .collect();

        // No common temperature range exists for a group
        supported.remove(&ColorMode::ColorTemp);

        if supported.is_empty() {
            supported.insert(ColorMode::Unknown);
        }

        Self {
            network,
            bus,
            group_id: group.group_id,
            name: group.name,
            members: MemberCells::new(group.units),
            supported,
            subscriptions: Subscriptions::default(),
        }
    }

    fn first_with(&self, control_type: UnitControlType) -> Option<Unit> {
        self.members
            .get()
            .into_iter()
            .find(|u| u.has_control(control_type))
    }
}

impl Entity for CasambiLightGroup {
    fn platform(&self) -> Platform {
        Platform::Light
    }

    fn unique_id(&self) -> String {
        format!("{}-group-{}", self.network.network_id(), self.group_id)
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::network_ref(&self.network)
    }

    fn available(&self) -> bool {
        self.network.available() && self.members.get().iter().any(|u| u.online)
    }

    fn added_to_host(&self) {
        let callback = member_callback(
            self.members.clone(),
            self.bus.clone(),
            self.group_id,
            self.platform(),
            self.unique_id(),
        );
        for unit in self.members.get() {
            self.subscriptions
                .subscribe(&self.network, &unit, Arc::clone(&callback));
        }
    }

    fn will_remove_from_host(&self) -> Result<(), NetworkError> {
        self.subscriptions.unsubscribe_all(&self.network)
    }
}

#[async_trait]
impl LightEntity for CasambiLightGroup {
    fn supported_color_modes(&self) -> &BTreeSet<ColorMode> {
        &self.supported
    }

    fn is_on(&self) -> bool {
        self.members.get().iter().any(Unit::is_on)
    }

    fn brightness(&self) -> Option<u8> {
        self.first_with(UnitControlType::Dimmer)?.state?.dimmer
    }

    fn rgb_color(&self) -> Option<(u8, u8, u8)> {
        self.first_with(UnitControlType::Rgb)?.state?.rgb
    }

    fn rgbw_color(&self) -> Option<(u8, u8, u8, u8)> {
        let state = self.first_with(UnitControlType::Rgb)?.state?;
        let (r, g, b) = state.rgb?;
        Some((r, g, b, state.white?))
    }

    async fn turn_on(&self, params: TurnOnParams) -> Result<(), NetworkError> {
        let session = self.network.session();
        let target = Target::Group(self.group_id);

        let mut was_set = false;
        if let Some(brightness) = params.brightness {
            session.set_level(target, brightness).await?;
            was_set = true;
        }
        if let Some(rgb) = params.rgb {
            session.set_color(target, rgb).await?;
            was_set = true;
        } else if let Some((r, g, b, w)) = params.rgbw {
            session.set_color(target, (r, g, b)).await?;
            session.set_white(target, w).await?;
            was_set = true;
        }

        if !was_set {
            session.turn_on(target).await?;
        } else if params.brightness.is_none() {
            // Bring every member up to the group level so the new color shows
            if let Some(level) = self.brightness() {
                session.set_level(target, level).await?;
            }
        }
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), NetworkError> {
        self.network
            .session()
            .set_level(Target::Group(self.group_id), 0)
            .await?;
        Ok(())
    }
}
