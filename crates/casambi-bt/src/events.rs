//! Host event bus

use crate::constants::{Platform, STATE_CHANGED_EVENT, SWITCH_EVENT};
use casambi_protocol::SwitchEvent;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

/// An event fired on the host bus
#[derive(Debug, Clone, Serialize)]
pub struct HostEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Broadcast bus shared by all config entries
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    #[must_use] pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire an event; returns the number of subscribers that received it
    pub fn fire(&self, event_type: &str, data: serde_json::Value) -> usize {
        self.tx
            .send(HostEvent {
                event_type: event_type.to_string(),
                data,
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    /// Fire a switch event for the entry
    pub fn fire_switch_event(&self, entry_id: &str, event: &SwitchEvent) {
        self.fire(SWITCH_EVENT, switch_event_data(entry_id, event));
        tracing::debug!(
            "Fired {} for unit {} button {} - {}",
            SWITCH_EVENT,
            event.unit_id,
            event.button,
            event.action
        );
    }

    /// Ask the host to re-read the state of an entity
    ///
    /// Unique ids are only unique within a platform, so both are sent.
    pub fn fire_state_changed(&self, platform: Platform, unique_id: &str) {
        self.fire(
            STATE_CHANGED_EVENT,
            json!({ "platform": platform.as_str(), "unique_id": unique_id }),
        );
    }
}

/// Bus payload of a switch event, binary fields hex-encoded
#[must_use] pub fn switch_event_data(entry_id: &str, event: &SwitchEvent) -> serde_json::Value {
    json!({
        "entry_id": entry_id,
        "unit_id": event.unit_id,
        "button": event.button,
        "action": event.action.as_str(),
        "message_type": event.message_type,
        "flags": event.flags,
        "packet_sequence": event.packet_sequence,
        "raw_packet": hex::encode(&event.raw_packet),
        "decrypted_data": hex::encode(&event.decrypted_data),
        "message_position": event.message_position,
        "payload_hex": event.payload_hex(),
        "extra_data": event.extra_data.as_ref().map(hex::encode),
    })
}
