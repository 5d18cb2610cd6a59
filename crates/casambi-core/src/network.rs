//! Casambi network supervision

use crate::config::NetworkConfig;
use crate::dedup::{DedupKey, DedupOutcome, EventDeduplicator};
use crate::error::NetworkError;
use crate::listeners::{
    ListenerId, ListenerRegistry, SwitchEventCallback, SwitchListeners, UnitCallback,
};
use casambi_protocol::{
    BluetoothHost, CasambiSession, Group, ProtocolError, Scene, SessionEvent, SwitchEvent, Unit,
    UnitControlType,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleeping reconnect of one disconnect episode
struct ReconnectTimer {
    episode: u64,
    handle: JoinHandle<()>,
}

/// Supervisor for one Casambi network session
///
/// Owns the session, reconnects after unsolicited disconnects and fans out
/// unit updates and switch events. Only one reconnect sequence (teardown
/// followed by connect) runs at a time.
pub struct CasambiNetwork {
    /// Network address (MAC of the gateway unit)
    address: String,
    password: String,
    /// External library session
    session: Arc<dyn CasambiSession>,
    /// Host Bluetooth manager
    host: Arc<dyn BluetoothHost>,
    config: NetworkConfig,
    unit_listeners: ListenerRegistry,
    switch_listeners: SwitchListeners,
    dedup: Mutex<EventDeduplicator>,
    /// Held for the whole of `disconnect` and `try_reconnect`
    reconnect_lock: tokio::sync::Mutex<()>,
    /// Delayed reconnect of the current disconnect episode
    reconnect_timer: Mutex<Option<ReconnectTimer>>,
    episodes: AtomicU64,
    /// Session event pump; aborting it unregisters all session hooks
    event_listener: Mutex<Option<JoinHandle<()>>>,
    /// Reacts to advertisements of the network address
    availability_watcher: Mutex<Option<JoinHandle<()>>>,
    hooks_registered: AtomicBool,
}

impl CasambiNetwork {
    /// Create a supervisor; nothing happens until [`CasambiNetwork::connect`]
    pub fn new(
        address: impl Into<String>,
        password: impl Into<String>,
        session: Arc<dyn CasambiSession>,
        host: Arc<dyn BluetoothHost>,
        config: NetworkConfig,
    ) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            session,
            host,
            config,
            unit_listeners: ListenerRegistry::new(),
            switch_listeners: SwitchListeners::new(),
            dedup: Mutex::new(EventDeduplicator::new(config.dedup_window)),
            reconnect_lock: tokio::sync::Mutex::new(()),
            reconnect_timer: Mutex::new(None),
            episodes: AtomicU64::new(0),
            event_listener: Mutex::new(None),
            availability_watcher: Mutex::new(None),
            hooks_registered: AtomicBool::new(false),
        }
    }

    /// Connect to the network
    ///
    /// Resolves the device through the host, registers the session hooks and
    /// authenticates. On success the disconnect-triggered reconnect is re-armed.
    pub async fn connect(self: &Arc<Self>) -> Result<(), NetworkError> {
        let device = self
            .host
            .device_from_address(&self.address, true)
            .ok_or_else(|| NetworkError::NetworkNotFound {
                address: self.address.clone(),
            })?;

        self.start_event_listener();

        tracing::info!("Connecting to Casambi network at {}", self.address);
        if let Err(e) = self.session.connect(&device, &self.password).await {
            tracing::debug!("Connect to {} failed: {}", self.address, e);
            return Err(NetworkError::from_connect(&self.address, e));
        }

        // A new disconnect episode may schedule its own reconnect
        lock(&self.reconnect_timer).take();

        tracing::info!(
            "Connected to Casambi network '{}' ({})",
            self.session.network_name(),
            self.address
        );

        // Registered only after the first connection, otherwise the first
        // advertisement would start a second connect in parallel.
        self.start_availability_watcher();

        Ok(())
    }

    /// Disconnect and disable automatic reconnects
    ///
    /// Teardown failures are logged, not returned.
    pub async fn disconnect(&self) {
        let _guard = self.reconnect_lock.lock().await;

        if let Some(timer) = lock(&self.reconnect_timer).take() {
            timer.handle.abort();
        }
        if let Some(watcher) = lock(&self.availability_watcher).take() {
            watcher.abort();
        }

        // Must happen before the teardown: disconnects initiated by us are
        // not link losses.
        self.hooks_registered.store(false, Ordering::SeqCst);
        if let Some(listener) = lock(&self.event_listener).take() {
            listener.abort();
        }

        if let Err(e) = self.session.disconnect().await {
            tracing::error!("Error during disconnect from {}: {}", self.address, e);
        }
        tracing::info!("Disconnected from Casambi network {}", self.address);
    }

    /// Tear down any half-open session and connect again
    ///
    /// Returns immediately if a reconnect is already running.
    pub async fn try_reconnect(self: &Arc<Self>) -> Result<(), NetworkError> {
        let Ok(_guard) = self.reconnect_lock.try_lock() else {
            tracing::debug!("Reconnect to {} already in progress", self.address);
            return Ok(());
        };

        match self.session.disconnect().await {
            Ok(()) => {}
            Err(ProtocolError::NotConnected) => {
                tracing::debug!("Nothing to tear down before reconnecting");
            }
            Err(e) => return Err(NetworkError::Protocol(e)),
        }

        self.connect().await
    }

    /// Whether the session is currently connected
    #[must_use] pub fn available(&self) -> bool {
        self.session.connected()
    }

    /// Whether a delayed reconnect is sleeping or running
    #[must_use] pub fn reconnect_pending(&self) -> bool {
        lock(&self.reconnect_timer)
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    #[must_use] pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use] pub fn network_id(&self) -> String {
        self.session.network_id()
    }

    #[must_use] pub fn network_name(&self) -> String {
        self.session.network_name()
    }

    /// Session handle for control commands
    #[must_use] pub fn session(&self) -> &Arc<dyn CasambiSession> {
        &self.session
    }

    /// All units, or only those exposing one of `control_types`
    #[must_use] pub fn units(&self, control_types: &[UnitControlType]) -> Vec<Unit> {
        let units = self.session.units();
        if control_types.is_empty() {
            return units;
        }
        units
            .into_iter()
            .filter(|u| u.has_any_control(control_types))
            .collect()
    }

    pub fn unit(&self, device_id: u16) -> Result<Unit, NetworkError> {
        self.session
            .units()
            .into_iter()
            .find(|u| u.device_id == device_id)
            .ok_or(NetworkError::UnitNotFound(device_id))
    }

    #[must_use] pub fn groups(&self) -> Vec<Group> {
        self.session.groups()
    }

    #[must_use] pub fn scenes(&self) -> Vec<Scene> {
        self.session.scenes()
    }

    /// Report changes of `unit` to `callback`
    pub fn register_unit_updates(&self, unit: &Unit, callback: UnitCallback) -> ListenerId {
        self.unit_listeners.register(unit.device_id, callback)
    }

    /// Stop reporting changes of `unit` to the listener `id`
    pub fn unregister_unit_updates(&self, unit: &Unit, id: ListenerId) -> Result<(), NetworkError> {
        self.unit_listeners.unregister(unit.device_id, id)
    }

    pub fn register_switch_event_callback(&self, callback: SwitchEventCallback) -> ListenerId {
        let id = self.switch_listeners.register(callback);
        tracing::debug!("Registered switch event callback {}", id);
        id
    }

    pub fn unregister_switch_event_callback(&self, id: ListenerId) {
        if self.switch_listeners.unregister(id) {
            tracing::debug!("Unregistered switch event callback {}", id);
        }
    }

    /// Start the session event pump unless it is already running
    fn start_event_listener(self: &Arc<Self>) {
        self.hooks_registered.store(true, Ordering::SeqCst);

        let mut slot = lock(&self.event_listener);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut rx = self.session.subscribe();
        let network = Arc::downgrade(self);

        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(network) = network.upgrade() else {
                            break;
                        };
                        network.handle_session_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Session event listener lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Session event channel closed, stopping listener");
                        break;
                    }
                }
            }
        }));
    }

    /// Start watching advertisements unless already watching
    fn start_availability_watcher(self: &Arc<Self>) {
        let mut slot = lock(&self.availability_watcher);
        if slot.is_some() {
            return;
        }

        let mut rx = self.host.subscribe_advertisements();
        let network = Arc::downgrade(self);

        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(adv) => {
                        let Some(network) = network.upgrade() else {
                            break;
                        };
                        if adv.connectable
                            && adv.address.eq_ignore_ascii_case(&network.address)
                            && !network.session.connected()
                        {
                            tracing::debug!(
                                "Network {} advertised by {}, reconnecting",
                                network.address,
                                adv.source
                            );
                            network.spawn_reconnect();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Availability watcher lagged by {} advertisements", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Advertisement channel closed, stopping watcher");
                        break;
                    }
                }
            }
        }));
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let network = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = network.try_reconnect().await {
                tracing::warn!("Reconnect to {} failed: {}", network.address, e);
            }
        });
    }

    fn handle_session_event(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::Disconnected => self.handle_disconnect(),
            SessionEvent::UnitChanged(unit) => self.dispatch_unit_changed(&unit),
            SessionEvent::SwitchEvent(event) => self.dispatch_switch_event(event),
        }
    }

    /// Arm the delayed reconnect once per disconnect episode
    fn handle_disconnect(self: &Arc<Self>) {
        if !self.hooks_registered.load(Ordering::SeqCst) {
            return;
        }
        // Late notification of a teardown that a reconnect already replaced
        if self.session.connected() {
            tracing::debug!("Ignoring disconnect of {}, session is connected", self.address);
            return;
        }

        let mut timer = lock(&self.reconnect_timer);
        if timer.is_some() {
            tracing::debug!("Reconnect for {} already scheduled", self.address);
            return;
        }

        let delay = self.config.reconnect_delay;
        tracing::info!(
            "Lost connection to {}, reconnecting in {}s",
            self.address,
            delay.as_secs()
        );
        let episode = self.episodes.fetch_add(1, Ordering::SeqCst) + 1;
        *timer = Some(ReconnectTimer {
            episode,
            handle: tokio::spawn(Self::delayed_reconnect(
                Arc::downgrade(self),
                delay,
                episode,
            )),
        });
    }

    /// Free the timer slot if it still belongs to `episode`
    fn clear_reconnect_timer(&self, episode: u64) {
        let mut timer = lock(&self.reconnect_timer);
        if timer.as_ref().is_some_and(|t| t.episode == episode) {
            *timer = None;
        }
    }

    async fn delayed_reconnect(network: Weak<Self>, delay: Duration, episode: u64) {
        tokio::time::sleep(delay).await;

        let Some(network) = network.upgrade() else {
            return;
        };

        {
            // Wait out a reconnect that might already be running
            let _guard = network.reconnect_lock.lock().await;
            if network.session.connected() {
                network.clear_reconnect_timer(episode);
                return;
            }
        }

        tracing::debug!("Starting delayed reconnect to {}", network.address);
        if network
            .host
            .device_from_address(&network.address, true)
            .is_none()
        {
            tracing::debug!(
                "Skipping reconnect, host reports {} not present",
                network.address
            );
            return;
        }

        if let Err(e) = network.try_reconnect().await {
            tracing::warn!(
                "Error during reconnect to {} (this is not unusual): {}",
                network.address,
                e
            );
        }
    }

    fn dispatch_unit_changed(&self, unit: &Unit) {
        let delivered = self.unit_listeners.dispatch(unit);
        if delivered > 0 {
            tracing::debug!(
                "Unit {} changed, notified {} listeners",
                unit.device_id,
                delivered
            );
        }
    }

    fn dispatch_switch_event(&self, event: SwitchEvent) {
        tracing::debug!(
            "Switch event received: unit={} button={} action={}",
            event.unit_id,
            event.button,
            event.action
        );

        if !event.payload.is_empty() {
            let key = DedupKey::from_event(&event);
            if let DedupOutcome::Duplicate { age } = lock(&self.dedup).check(key, Instant::now()) {
                let payload = event.payload_hex();
                tracing::debug!(
                    "Skipping duplicate event: unit={}, button={}, payload={} (last seen {:.1}s ago)",
                    event.unit_id,
                    event.button,
                    &payload[..payload.len().min(8)],
                    age.as_secs_f64()
                );
                return;
            }
        }

        for callback in self.switch_listeners.snapshot() {
            match callback {
                SwitchEventCallback::Sync(cb) => cb(&event),
                SwitchEventCallback::Async(cb) => {
                    tokio::spawn(cb(event.clone()));
                }
            }
        }
    }
}

impl Drop for CasambiNetwork {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.reconnect_timer).take() {
            timer.handle.abort();
        }
        for slot in [&self.event_listener, &self.availability_watcher] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casambi_protocol::testing::{ConnectOutcome, MockBluetoothHost, MockSession};
    use casambi_protocol::{BleDevice, ButtonAction, UnitControl, UnitType};
    use futures::FutureExt;
    use tokio::sync::mpsc;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    struct Harness {
        network: Arc<CasambiNetwork>,
        session: Arc<MockSession>,
        host: Arc<MockBluetoothHost>,
    }

    fn harness_with(session: MockSession) -> Harness {
        let session = Arc::new(session);
        let host = Arc::new(MockBluetoothHost::new());
        host.set_present(ADDR, true);
        let network = Arc::new(CasambiNetwork::new(
            ADDR,
            "secret",
            session.clone(),
            host.clone(),
            NetworkConfig::default(),
        ));
        Harness {
            network,
            session,
            host,
        }
    }

    fn harness() -> Harness {
        harness_with(MockSession::new())
    }

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

    fn switch_event(unit_id: u16, button: u8, payload: &[u8]) -> SwitchEvent {
        SwitchEvent {
            unit_id,
            button,
            action: ButtonAction::ButtonPress,
            message_type: 0x08,
            flags: 0,
            packet_sequence: 1,
            raw_packet: vec![0x01],
            decrypted_data: vec![0x02],
            message_position: 0,
            payload: payload.to_vec(),
            extra_data: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_registers_hooks() {
        let h = harness();
        h.network.connect().await.unwrap();

        assert!(h.network.available());
        assert_eq!(h.session.subscriber_count(), 1);
        assert_eq!(h.host.advertisement_subscribers(), 1);
        assert_eq!(h.session.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_missing_device_is_not_found() {
        let h = harness();
        h.host.set_present(ADDR, false);

        let err = h.network.connect().await.unwrap_err();
        assert!(matches!(err, NetworkError::NetworkNotFound { .. }));
        assert_eq!(h.session.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_error_kinds() {
        let h = harness();

        h.session.push_connect_outcome(ConnectOutcome::Authentication);
        let err = h.network.connect().await.unwrap_err();
        assert!(err.is_auth_failure());

        h.session.push_connect_outcome(ConnectOutcome::Bluetooth);
        let err = h.network.connect().await.unwrap_err();
        assert!(matches!(err, NetworkError::TransportUnavailable(_)));

        h.session.push_connect_outcome(ConnectOutcome::NetworkNotFound);
        let err = h.network.connect().await.unwrap_err();
        assert!(matches!(err, NetworkError::NetworkNotFound { .. }));

        h.session.push_connect_outcome(ConnectOutcome::Other);
        let err = h.network.connect().await.unwrap_err();
        assert!(matches!(err, NetworkError::Unexpected { .. }));

        // Availability watching starts only after a successful connect
        assert_eq!(h.host.advertisement_subscribers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_try_reconnect_runs_once() {
        let h = harness_with(MockSession::new().with_connect_delay(Duration::from_secs(1)));

        let (a, b) = tokio::join!(h.network.try_reconnect(), h.network.try_reconnect());
        a.unwrap();
        b.unwrap();

        assert_eq!(h.session.disconnect_count(), 1);
        assert_eq!(h.session.connect_count(), 1);
        assert!(h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_reconnect_releases_lock_on_failure() {
        let h = harness();
        h.session.push_connect_outcome(ConnectOutcome::Authentication);

        assert!(h.network.try_reconnect().await.unwrap_err().is_auth_failure());
        h.network.try_reconnect().await.unwrap();
        assert_eq!(h.session.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_schedules_one_delayed_reconnect() {
        let h = harness();
        h.network.connect().await.unwrap();
        h.session.clear_calls();

        h.session.drop_link();
        h.session.drop_link();
        settle().await;
        assert!(h.network.reconnect_pending());
        assert_eq!(h.session.connect_count(), 0);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(h.session.connect_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.session.connect_count(), 1);
        assert!(h.network.available());
        assert!(!h.network.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_reconnect_skipped_when_device_absent() {
        let h = harness();
        h.network.connect().await.unwrap();
        h.session.clear_calls();

        h.session.drop_link();
        settle().await;
        h.host.set_present(ADDR, false);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(h.session.calls().is_empty());
        assert!(!h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_reconnect_aborts_when_already_connected() {
        let h = harness();
        h.network.connect().await.unwrap();

        h.session.drop_link();
        settle().await;
        h.network.try_reconnect().await.unwrap();
        h.session.clear_calls();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.session.connect_count(), 0);
        assert!(h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_of_live_session_keeps_next_episode_armed() {
        let h = harness();
        h.network.connect().await.unwrap();

        // The teardown reports a disconnect that arrives after the new connect
        h.network.try_reconnect().await.unwrap();
        settle().await;
        assert!(!h.network.reconnect_pending());

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.session.clear_calls();

        h.session.drop_link();
        settle().await;
        assert!(h.network.reconnect_pending());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.session.connect_count(), 1);
        assert!(h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_waking_connected_frees_its_slot() {
        let h = harness();
        h.network.connect().await.unwrap();

        h.session.drop_link();
        settle().await;
        assert!(h.network.reconnect_pending());

        // Session recovers without going through the supervisor
        h.session
            .connect(&BleDevice::new(ADDR), "secret")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(lock(&h.network.reconnect_timer).is_none());
        h.session.clear_calls();

        h.session.drop_link();
        settle().await;
        assert!(h.network.reconnect_pending());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.session.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_reconnect_stops_on_teardown_error() {
        let h = harness();
        h.network.connect().await.unwrap();
        h.session.set_fail_disconnect(true);

        let err = h.network.try_reconnect().await.unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Protocol(ProtocolError::Bluetooth(_))
        ));
        assert_eq!(h.session.connect_count(), 1);
        assert!(!h.network.available());

        // Lock was released
        h.session.set_fail_disconnect(false);
        h.network.try_reconnect().await.unwrap();
        assert_eq!(h.session.connect_count(), 2);
        assert!(h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect_never_reconnects() {
        let h = harness();
        h.network.connect().await.unwrap();
        h.session.clear_calls();

        h.network.disconnect().await;
        settle().await;
        assert!(!h.network.reconnect_pending());

        h.session.drop_link();
        h.host.advertise(ADDR, true);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.session.connect_count(), 0);
        assert_eq!(h.session.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_timer() {
        let h = harness();
        h.network.connect().await.unwrap();

        h.session.drop_link();
        settle().await;
        assert!(h.network.reconnect_pending());

        h.network.disconnect().await;
        assert!(!h.network.reconnect_pending());
        h.session.clear_calls();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.session.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_swallows_teardown_failure() {
        let h = harness();
        h.network.connect().await.unwrap();
        h.session.set_fail_disconnect(true);

        h.network.disconnect().await;

        // Lock was released
        h.session.set_fail_disconnect(false);
        h.network.try_reconnect().await.unwrap();
        assert_eq!(h.session.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advertisement_triggers_reconnect() {
        let h = harness();
        h.network.connect().await.unwrap();

        // Ignored while connected
        h.host.advertise(ADDR, true);
        settle().await;
        assert_eq!(h.session.connect_count(), 1);

        h.session.drop_link();
        settle().await;

        h.host.advertise(ADDR, false);
        h.host.advertise("11:22:33:44:55:66", true);
        settle().await;
        assert_eq!(h.session.connect_count(), 1);

        h.host.advertise(&ADDR.to_lowercase(), true);
        settle().await;
        assert_eq!(h.session.connect_count(), 2);
        assert!(h.network.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_changes_reach_listeners() {
        let h = harness();
        h.network.connect().await.unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let log = Arc::clone(&log);
            h.network.register_unit_updates(
                &unit(1),
                Arc::new(move |u: &Unit| log.lock().unwrap().push(("first", u.device_id))),
            )
        };
        {
            let log = Arc::clone(&log);
            h.network.register_unit_updates(
                &unit(1),
                Arc::new(move |u: &Unit| log.lock().unwrap().push(("second", u.device_id))),
            );
        }

        h.session.emit_unit_changed(unit(1));
        h.session.emit_unit_changed(unit(2));
        settle().await;
        assert_eq!(*log.lock().unwrap(), vec![("first", 1), ("second", 1)]);

        h.network.unregister_unit_updates(&unit(1), first).unwrap();
        assert!(h.network.unregister_unit_updates(&unit(1), first).is_err());
        assert!(h.network.unregister_unit_updates(&unit(2), first).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_events_are_deduplicated() {
        let h = harness();
        let count = Arc::new(Mutex::new(0usize));
        {
            let count = Arc::clone(&count);
            h.network
                .register_switch_event_callback(SwitchEventCallback::sync(move |_| {
                    *count.lock().unwrap() += 1;
                }));
        }

        let event = switch_event(5, 2, &[0xAA, 0xBB]);
        h.network.handle_session_event(SessionEvent::SwitchEvent(event.clone()));
        assert_eq!(*count.lock().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        h.network.handle_session_event(SessionEvent::SwitchEvent(event.clone()));
        assert_eq!(*count.lock().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        h.network.handle_session_event(SessionEvent::SwitchEvent(event));
        assert_eq!(*count.lock().unwrap(), 2);

        // Another button is a different key
        h.network
            .handle_session_event(SessionEvent::SwitchEvent(switch_event(5, 3, &[0xAA, 0xBB])));
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_bypasses_dedup() {
        let h = harness();
        let count = Arc::new(Mutex::new(0usize));
        {
            let count = Arc::clone(&count);
            h.network
                .register_switch_event_callback(SwitchEventCallback::sync(move |_| {
                    *count.lock().unwrap() += 1;
                }));
        }

        for _ in 0..3 {
            h.network
                .handle_session_event(SessionEvent::SwitchEvent(switch_event(1, 1, &[])));
        }
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_switch_callback_is_spawned() {
        let h = harness();
        h.network.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        h.network
            .register_switch_event_callback(SwitchEventCallback::future(move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event.unit_id);
                }
                .boxed()
            }));

        h.session.emit_switch_event(switch_event(7, 1, &[0x01]));
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisors_do_not_share_state() {
        let a = harness();
        let b = harness();
        let hits = Arc::new(Mutex::new(0usize));
        {
            let hits = Arc::clone(&hits);
            a.network.register_unit_updates(
                &unit(1),
                Arc::new(move |_| *hits.lock().unwrap() += 1),
            );
        }

        b.network
            .handle_session_event(SessionEvent::UnitChanged(unit(1)));
        assert_eq!(*hits.lock().unwrap(), 0);

        a.network
            .handle_session_event(SessionEvent::UnitChanged(unit(1)));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_units_filtered_by_control() {
        let mut vertical = unit(2);
        vertical.unit_type.controls = vec![UnitControl::new(UnitControlType::Vertical)];
        let h = harness_with(MockSession::new().with_units(vec![unit(1), vertical]));

        assert_eq!(h.network.units(&[]).len(), 2);
        let only = h.network.units(&[UnitControlType::Vertical]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].device_id, 2);
        assert!(matches!(
            h.network.unit(9),
            Err(NetworkError::UnitNotFound(9))
        ));
    }
}
