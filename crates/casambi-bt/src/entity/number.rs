//! Vertical control of units and groups as number entities

use super::{
    member_callback, unit_callback, DeviceInfo, Entity, MemberCells, Subscriptions, UnitCell,
};
use crate::constants::Platform;
use crate::events::EventBus;
use async_trait::async_trait;
use casambi_core::{CasambiNetwork, NetworkError};
use casambi_protocol::{Group, Target, Unit, UnitControlType};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberDeviceClass {
    Illuminance,
}

/// Numeric entity surface exposed to the host
#[async_trait]
pub trait NumberEntity: Entity {
    fn device_class(&self) -> NumberDeviceClass {
        NumberDeviceClass::Illuminance
    }

    fn native_min_value(&self) -> f64 {
        0.0
    }

    fn native_max_value(&self) -> f64 {
        255.0
    }

    fn native_value(&self) -> Option<f64>;

    async fn set_native_value(&self, value: f64) -> Result<(), NetworkError>;
}

/// Whether any member of the group has a vertical control
#[must_use] pub fn group_has_vertical(group: &Group) -> bool {
    group
        .units
        .iter()
        .any(|u| u.has_control(UnitControlType::Vertical))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn vertical_level(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

pub struct CasambiVerticalNumberUnit {
    network: Arc<CasambiNetwork>,
    bus: EventBus,
    unit: UnitCell,
    subscriptions: Subscriptions,
}

impl CasambiVerticalNumberUnit {
    pub fn new(network: Arc<CasambiNetwork>, bus: EventBus, unit: Unit) -> Self {
        Self {
            network,
            bus,
            unit: UnitCell::new(unit),
            subscriptions: Subscriptions::default(),
        }
    }
}

impl Entity for CasambiVerticalNumberUnit {
    fn platform(&self) -> Platform {
        Platform::Number
    }

    fn unique_id(&self) -> String {
        format!(
            "{}-unit-{}-vertical",
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
impl NumberEntity for CasambiVerticalNumberUnit {
    fn native_value(&self) -> Option<f64> {
        self.unit
            .get()
            .state
            .and_then(|s| s.vertical)
            .map(f64::from)
    }

    async fn set_native_value(&self, value: f64) -> Result<(), NetworkError> {
        let target = Target::from(&self.unit.get());
        self.network
            .session()
            .set_vertical(target, vertical_level(value))
            .await?;
        Ok(())
    }
}

pub struct CasambiVerticalNumberGroup {
    network: Arc<CasambiNetwork>,
    bus: EventBus,
    group_id: u16,
    name: String,
    members: MemberCells,
    subscriptions: Subscriptions,
}

impl CasambiVerticalNumberGroup {
    pub fn new(network: Arc<CasambiNetwork>, bus: EventBus, group: Group) -> Self {
        Self {
            network,
            bus,
            group_id: group.group_id,
            name: group.name,
            members: MemberCells::new(group.units),
            subscriptions: Subscriptions::default(),
        }
    }
}

impl Entity for CasambiVerticalNumberGroup {
    fn platform(&self) -> Platform {
        Platform::Number
    }

    fn unique_id(&self) -> String {
        format!("{}-group-{}", self.network.network_id(), self.group_id)
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_network(&self.network)
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
impl NumberEntity for CasambiVerticalNumberGroup {
    /// Mean vertical value of the members reporting one
    fn native_value(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .members
            .get()
            .iter()
            .filter_map(|u| u.state.as_ref().and_then(|s| s.vertical))
            .map(f64::from)
            .collect();

        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = values.len() as f64;
        Some(values.iter().sum::<f64>() / count)
    }

    async fn set_native_value(&self, value: f64) -> Result<(), NetworkError> {
        self.network
            .session()
            .set_vertical(Target::Group(self.group_id), vertical_level(value))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::test_support::*;
    use casambi_protocol::testing::{MockSession, SessionCall};
    use casambi_protocol::UnitState;

    fn vertical_unit(device_id: u16, vertical: Option<u8>) -> Unit {
        with_state(
            unit(device_id, &[UnitControlType::Vertical]),
            UnitState {
                vertical,
                ..UnitState::default()
            },
        )
    }

    #[tokio::test]
    async fn test_unit_value_and_set() {
        let session = Arc::new(MockSession::new());
        let network = connected_network(session.clone()).await;
        let number =
            CasambiVerticalNumberUnit::new(network, EventBus::default(), vertical_unit(1, Some(64)));
        session.clear_calls();

        assert_eq!(number.native_value(), Some(64.0));
        assert_eq!(number.native_max_value(), 255.0);
        assert_eq!(number.unique_id(), "net-1-unit-uuid-1-vertical");

        number.set_native_value(300.0).await.unwrap();
        number.set_native_value(12.7).await.unwrap();
        assert_eq!(
            session.calls(),
            vec![
                SessionCall::SetVertical {
                    target: Target::Unit(1),
                    vertical: 255
                },
                SessionCall::SetVertical {
                    target: Target::Unit(1),
                    vertical: 12
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_group_value_is_mean_of_reporting_members() {
        let session = Arc::new(MockSession::new());
        let network = connected_network(session.clone()).await;
        let g = group(
            9,
            vec![
                vertical_unit(1, Some(100)),
                vertical_unit(2, None),
                vertical_unit(3, Some(50)),
            ],
        );
        assert!(group_has_vertical(&g));

        let number = CasambiVerticalNumberGroup::new(network, EventBus::default(), g);
        assert_eq!(number.native_value(), Some(75.0));

        session.clear_calls();
        number.set_native_value(10.0).await.unwrap();
        assert_eq!(
            session.calls(),
            vec![SessionCall::SetVertical {
                target: Target::Group(9),
                vertical: 10
            }]
        );
    }

    #[tokio::test]
    async fn test_group_without_values() {
        let session = Arc::new(MockSession::new());
        let network = connected_network(session).await;
        let g = group(1, vec![unit(1, &[UnitControlType::Dimmer])]);
        assert!(!group_has_vertical(&g));

        let number = CasambiVerticalNumberGroup::new(network, EventBus::default(), g);
        assert_eq!(number.native_value(), None);
    }
}
