//! Listener registries for unit updates and switch events

use crate::error::NetworkError;
use casambi_protocol::{SwitchEvent, Unit};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked with the updated unit snapshot
pub type UnitCallback = Arc<dyn Fn(&Unit) + Send + Sync>;

/// Token identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Switch event consumer
#[derive(Clone)]
pub enum SwitchEventCallback {
    /// Runs inline during dispatch
    Sync(Arc<dyn Fn(&SwitchEvent) + Send + Sync>),
    /// Spawned as an independent task per event
    Async(Arc<dyn Fn(SwitchEvent) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl SwitchEventCallback {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&SwitchEvent) + Send + Sync + 'static,
    {
        SwitchEventCallback::Sync(Arc::new(f))
    }

    pub fn future<F>(f: F) -> Self
    where
        F: Fn(SwitchEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        SwitchEventCallback::Async(Arc::new(f))
    }
}

impl fmt::Debug for SwitchEventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchEventCallback::Sync(_) => f.write_str("SwitchEventCallback::Sync"),
            SwitchEventCallback::Async(_) => f.write_str("SwitchEventCallback::Async"),
        }
    }
}

/// Unit id -> callbacks in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<u16, Vec<(ListenerId, UnitCallback)>>,
}

impl ListenerRegistry {
    #[must_use] pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, unit_id: u16, callback: UnitCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(unit_id)
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a registration; unknown ids are an error
    pub fn unregister(&self, unit_id: u16, id: ListenerId) -> Result<(), NetworkError> {
        let mut entry = self
            .listeners
            .get_mut(&unit_id)
            .ok_or(NetworkError::ListenerNotRegistered { unit_id, id })?;

        let index = entry
            .iter()
            .position(|(existing, _)| *existing == id)
            .ok_or(NetworkError::ListenerNotRegistered { unit_id, id })?;
        entry.remove(index);

        let now_empty = entry.is_empty();
        drop(entry);
        if now_empty {
            self.listeners.remove_if(&unit_id, |_, v| v.is_empty());
        }
        Ok(())
    }

    /// Copy of the callbacks for `unit_id`
    #[must_use] pub fn snapshot(&self, unit_id: u16) -> Vec<UnitCallback> {
        self.listeners
            .get(&unit_id)
            .map(|entry| entry.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Invoke every callback registered for the unit, returning how many ran
    ///
    /// Iterates a snapshot; callbacks may (un)register during dispatch.
    pub fn dispatch(&self, unit: &Unit) -> usize {
        let callbacks = self.snapshot(unit.device_id);
        for callback in &callbacks {
            callback(unit);
        }
        callbacks.len()
    }

    #[must_use] pub fn listener_count(&self, unit_id: u16) -> usize {
        self.listeners.get(&unit_id).map_or(0, |entry| entry.len())
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Switch event callbacks in registration order
#[derive(Default)]
pub struct SwitchListeners {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(ListenerId, SwitchEventCallback)>>,
}

impl SwitchListeners {
    #[must_use] pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: SwitchEventCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Remove a registration; returns false if it was not present
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    #[must_use] pub fn snapshot(&self) -> Vec<SwitchEventCallback> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    #[must_use] pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casambi_protocol::{UnitControl, UnitControlType, UnitType};
    use std::sync::OnceLock;

    fn unit(device_id: u16) -> Unit {
        Unit {
            device_id,
            uuid: format!("uuid-{device_id}"),
            address: String::new(),
            name: format!("Unit {device_id}"),
            firmware_version: None,
            unit_type: UnitType {
                id: 1,
                model: "m".to_string(),
                manufacturer: "x".to_string(),
                controls: vec![UnitControl::new(UnitControlType::Dimmer)],
            },
            online: true,
            state: None,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> UnitCallback {
        let log = Arc::clone(log);
        Arc::new(move |_unit: &Unit| log.lock().unwrap().push(name))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.register(1, recorder(&log, "first"));
        registry.register(1, recorder(&log, "second"));
        registry.register(2, recorder(&log, "other"));

        assert_eq!(registry.dispatch(&unit(1)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_dispatch_without_listeners_is_noop() {
        let registry = ListenerRegistry::new();
        assert_eq!(registry.dispatch(&unit(9)), 0);
    }

    #[test]
    fn test_unregister_unknown_is_error() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = registry.register(1, recorder(&log, "a"));

        // Wrong unit
        assert!(matches!(
            registry.unregister(2, id),
            Err(NetworkError::ListenerNotRegistered { unit_id: 2, .. })
        ));

        registry.unregister(1, id).unwrap();
        assert_eq!(registry.listener_count(1), 0);
        assert!(registry.is_empty());

        // Already removed
        assert!(registry.unregister(1, id).is_err());
    }

    #[test]
    fn test_callback_may_unregister_itself_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let own_id: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());

        let callback: UnitCallback = {
            let registry = Arc::clone(&registry);
            let own_id = Arc::clone(&own_id);
            let log = Arc::clone(&log);
            Arc::new(move |u: &Unit| {
                log.lock().unwrap().push("once");
                if let Some(id) = own_id.get() {
                    registry.unregister(u.device_id, *id).unwrap();
                }
            })
        };
        own_id.set(registry.register(1, callback)).unwrap();
        registry.register(1, recorder(&log, "always"));

        assert_eq!(registry.dispatch(&unit(1)), 2);
        assert_eq!(registry.dispatch(&unit(1)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["once", "always", "always"]);
    }

    #[test]
    fn test_switch_listeners_unregister() {
        let listeners = SwitchListeners::new();
        let id = listeners.register(SwitchEventCallback::sync(|_| {}));
        listeners.register(SwitchEventCallback::sync(|_| {}));
        assert_eq!(listeners.len(), 2);

        assert!(listeners.unregister(id));
        assert!(!listeners.unregister(id));
        assert_eq!(listeners.snapshot().len(), 1);
    }
}
