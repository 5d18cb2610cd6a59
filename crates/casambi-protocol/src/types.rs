//! Common types used throughout the protocol

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    #[error("Network not found")]
    NetworkNotFound,

    #[error("Authentication failed")]
    Authentication,

    #[error("Session not connected")]
    NotConnected,

    #[error("Request timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Control capabilities a unit type can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitControlType {
    OnOff,
    Dimmer,
    Rgb,
    White,
    Temperature,
    Vertical,
    Xy,
    ColorSource,
    Slider,
    Unknown,
}

/// A single control of a unit type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitControl {
    #[serde(rename = "type")]
    pub control_type: UnitControlType,
    /// Lower bound (Kelvin for temperature controls)
    #[serde(default)]
    pub min: Option<u32>,
    /// Upper bound (Kelvin for temperature controls)
    #[serde(default)]
    pub max: Option<u32>,
}

impl UnitControl {
    #[must_use] pub fn new(control_type: UnitControlType) -> Self {
        Self {
            control_type,
            min: None,
            max: None,
        }
    }

    #[must_use] pub fn with_range(control_type: UnitControlType, min: u32, max: u32) -> Self {
        Self {
            control_type,
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Fixture description of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    pub id: u32,
    pub model: String,
    pub manufacturer: String,
    pub controls: Vec<UnitControl>,
}

impl UnitType {
    /// Look up the control of the given type
    #[must_use] pub fn get_control(&self, control_type: UnitControlType) -> Option<&UnitControl> {
        self.controls.iter().find(|c| c.control_type == control_type)
    }

    #[must_use] pub fn has_control(&self, control_type: UnitControlType) -> bool {
        self.get_control(control_type).is_some()
    }
}

/// Last reported output state of a unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub dimmer: Option<u8>,
    pub vertical: Option<u8>,
    pub rgb: Option<(u8, u8, u8)>,
    pub white: Option<u8>,
    /// Color temperature in Kelvin
    pub temperature: Option<u32>,
    /// CIE 1931 chromaticity
    pub xy: Option<(f32, f32)>,
}

/// A controllable device in the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Mesh-local device id
    pub device_id: u16,
    pub uuid: String,
    pub address: String,
    pub name: String,
    pub firmware_version: Option<String>,
    pub unit_type: UnitType,
    pub online: bool,
    /// `None` when the update carried no state (typically an offline unit)
    pub state: Option<UnitState>,
}

impl Unit {
    /// A unit is on when it is online and its state does not report a zero dimmer
    #[must_use] pub fn is_on(&self) -> bool {
        self.online
            && self
                .state
                .as_ref()
                .is_some_and(|s| s.dimmer.map_or(true, |d| d > 0))
    }

    #[must_use] pub fn has_control(&self, control_type: UnitControlType) -> bool {
        self.unit_type.has_control(control_type)
    }

    /// True if the unit exposes any of the given control types
    #[must_use] pub fn has_any_control(&self, control_types: &[UnitControlType]) -> bool {
        self.unit_type
            .controls
            .iter()
            .any(|c| control_types.contains(&c.control_type))
    }
}

/// A named collection of units controlled together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: u16,
    pub name: String,
    pub units: Vec<Unit>,
}

/// A named preset for multiple units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: u16,
    pub name: String,
}

/// Addressee of a control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Unit(u16),
    Group(u16),
    Network,
}

impl From<&Unit> for Target {
    fn from(unit: &Unit) -> Self {
        Target::Unit(unit.device_id)
    }
}

impl From<&Group> for Target {
    fn from(group: &Group) -> Self {
        Target::Group(group.group_id)
    }
}

/// Physical button action reported by a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    ButtonPress,
    ButtonHold,
    ButtonRelease,
    ButtonReleaseAfterHold,
}

impl ButtonAction {
    #[must_use] pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::ButtonPress => "button_press",
            ButtonAction::ButtonHold => "button_hold",
            ButtonAction::ButtonRelease => "button_release",
            ButtonAction::ButtonReleaseAfterHold => "button_release_after_hold",
        }
    }
}

impl std::fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded switch message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    pub unit_id: u16,
    pub button: u8,
    pub action: ButtonAction,
    pub message_type: u8,
    pub flags: u8,
    pub packet_sequence: u32,
    pub raw_packet: Vec<u8>,
    pub decrypted_data: Vec<u8>,
    /// Offset of this message inside the decrypted packet
    pub message_position: usize,
    pub payload: Vec<u8>,
    pub extra_data: Option<Vec<u8>>,
}

impl SwitchEvent {
    /// Lower-case hex of the payload, used as the event fingerprint
    #[must_use] pub fn payload_hex(&self) -> String {
        hex::encode(&self.payload)
    }
}
