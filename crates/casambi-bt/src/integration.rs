//! Integration lifecycle across all config entries

use crate::config::EntryStore;
use crate::config_flow::{ConfigFlow, FlowResult};
use crate::error::IntegrationError;
use crate::events::{EventBus, HostEvent};
use crate::setup::{setup_entry, unload_entry, LoadedEntry};
use casambi_core::{CasambiNetwork, NetworkConfig};
use casambi_protocol::{BluetoothHost, CasambiSession};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Creates a fresh session of the external library
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn CasambiSession> + Send + Sync>;

/// The Casambi integration as seen by the host
pub struct CasambiIntegration {
    store: EntryStore,
    bus: EventBus,
    host: Arc<dyn BluetoothHost>,
    session_factory: SessionFactory,
    config: NetworkConfig,
    /// Entry id -> loaded entry
    loaded: DashMap<String, LoadedEntry>,
    /// Serializes setup and unload of each entry
    entry_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CasambiIntegration {
    pub fn new(
        store: EntryStore,
        host: Arc<dyn BluetoothHost>,
        session_factory: SessionFactory,
    ) -> Self {
        Self {
            store,
            bus: EventBus::default(),
            host,
            session_factory,
            config: NetworkConfig::default(),
            loaded: DashMap::new(),
            entry_locks: DashMap::new(),
        }
    }

    #[must_use] pub fn with_config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use] pub fn store(&self) -> &EntryStore {
        &self.store
    }

    #[must_use] pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to host events
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.bus.subscribe()
    }

    /// Start a new config flow
    #[must_use] pub fn config_flow(&self) -> ConfigFlow<'_> {
        ConfigFlow::new(
            &self.store,
            Arc::clone(&self.host),
            Arc::clone(&self.session_factory),
        )
    }

    #[must_use] pub fn is_loaded(&self, entry_id: &str) -> bool {
        self.loaded.contains_key(entry_id)
    }

    /// Network of a loaded entry
    #[must_use] pub fn network(&self, entry_id: &str) -> Option<Arc<CasambiNetwork>> {
        self.loaded
            .get(entry_id)
            .map(|loaded| Arc::clone(&loaded.network))
    }

    fn entry_lock(&self, entry_id: &str) -> Arc<Mutex<()>> {
        self.entry_locks
            .entry(entry_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Set up one entry; already loaded entries are left alone
    pub async fn setup(&self, entry_id: &str) -> Result<(), IntegrationError> {
        let entry_lock = self.entry_lock(entry_id);
        let _guard = entry_lock.lock().await;

        if self.is_loaded(entry_id) {
            tracing::debug!("Config entry {} already loaded", entry_id);
            return Ok(());
        }

        let entry = self
            .store
            .get(entry_id)
            .ok_or_else(|| IntegrationError::EntryNotFound(entry_id.to_string()))?;

        let loaded = setup_entry(
            &entry,
            (self.session_factory)(),
            Arc::clone(&self.host),
            &self.bus,
            self.config,
        )
        .await?;

        self.loaded.insert(entry.entry_id, loaded);
        Ok(())
    }

    /// Set up every stored entry, returning how many are loaded afterwards
    pub async fn setup_all(&self) -> usize {
        for entry in self.store.list() {
            if let Err(e) = self.setup(&entry.entry_id).await {
                tracing::warn!("Failed to set up {} ({}): {}", entry.title, entry.entry_id, e);
            }
        }
        self.loaded.len()
    }

    pub async fn unload(&self, entry_id: &str) -> Result<(), IntegrationError> {
        let entry_lock = self.entry_lock(entry_id);
        let _guard = entry_lock.lock().await;

        let (_, loaded) = self
            .loaded
            .remove(entry_id)
            .ok_or_else(|| IntegrationError::EntryNotFound(entry_id.to_string()))?;
        unload_entry(loaded).await
    }

    pub async fn reload(&self, entry_id: &str) -> Result<(), IntegrationError> {
        tracing::info!("Reloading config entry {}", entry_id);
        if self.is_loaded(entry_id) {
            self.unload(entry_id).await?;
        }
        self.setup(entry_id).await
    }

    /// Unload (if needed) and delete an entry
    pub async fn remove_entry(&self, entry_id: &str) -> Result<(), IntegrationError> {
        if self.is_loaded(entry_id) {
            self.unload(entry_id).await?;
        }
        self.store.remove(entry_id).await?;
        self.entry_locks.remove(entry_id);
        Ok(())
    }

    /// Act on the final result of a config flow
    pub async fn handle_flow_result(&self, result: &FlowResult) -> Result<(), IntegrationError> {
        match result {
            FlowResult::CreateEntry { entry } => self.setup(&entry.entry_id).await,
            FlowResult::Abort {
                reload_entry: Some(entry_id),
                ..
            } => self.reload(entry_id).await,
            _ => Ok(()),
        }
    }

    /// Unload every entry
    pub async fn shutdown(&self) {
        let entry_ids: Vec<String> = self.loaded.iter().map(|r| r.key().clone()).collect();
        for entry_id in entry_ids {
            if let Err(e) = self.unload(&entry_id).await {
                tracing::warn!("Failed to unload {}: {}", entry_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_flow::UserInput;
    use crate::error::SetupError;
    use casambi_protocol::testing::{ConnectOutcome, MockBluetoothHost, MockSession};
    use std::time::Duration;
    use tempfile::TempDir;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    async fn integration(session: Arc<MockSession>) -> (TempDir, CasambiIntegration) {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::open(dir.path()).await;
        let host = Arc::new(MockBluetoothHost::new());
        host.set_present(ADDR, true);
        let factory: SessionFactory =
            Arc::new(move || Arc::clone(&session) as Arc<dyn CasambiSession>);
        (dir, CasambiIntegration::new(store, host, factory))
    }

    #[tokio::test]
    async fn test_flow_then_setup_and_unload() {
        let session = Arc::new(MockSession::new());
        let (_dir, integration) = integration(session.clone()).await;

        let result = integration
            .config_flow()
            .step_user(Some(UserInput::new(ADDR, "pw")))
            .await
            .unwrap();
        integration.handle_flow_result(&result).await.unwrap();

        let FlowResult::CreateEntry { entry } = result else {
            panic!("expected entry");
        };
        assert!(integration.is_loaded(&entry.entry_id));
        assert!(integration.network(&entry.entry_id).unwrap().available());

        integration.remove_entry(&entry.entry_id).await.unwrap();
        assert!(!integration.is_loaded(&entry.entry_id));
        assert!(integration.store().list().is_empty());
        assert!(!session.connected());
    }

    #[tokio::test]
    async fn test_reauth_reloads_entry() {
        let session = Arc::new(MockSession::new());
        let (_dir, integration) = integration(session.clone()).await;

        let FlowResult::CreateEntry { entry } = integration
            .config_flow()
            .step_user(Some(UserInput::new(ADDR, "pw")))
            .await
            .unwrap()
        else {
            panic!("expected entry");
        };

        // Setup is rejected until the password is fixed
        session.push_connect_outcome(ConnectOutcome::Authentication);
        let err = integration.setup(&entry.entry_id).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Setup(SetupError::AuthFailed(_))));

        let mut flow = integration.config_flow();
        flow.step_reauth(&entry.entry_id).unwrap();
        let result = flow.step_reauth_confirm(Some("fixed".into())).await.unwrap();
        integration.handle_flow_result(&result).await.unwrap();

        assert!(integration.is_loaded(&entry.entry_id));
        integration.shutdown().await;
        assert!(!integration.is_loaded(&entry.entry_id));
    }

    #[tokio::test]
    async fn test_overlapping_setups_connect_once() {
        let session = Arc::new(MockSession::new().with_connect_delay(Duration::from_millis(50)));
        let (_dir, integration) = integration(session.clone()).await;

        let FlowResult::CreateEntry { entry } = integration
            .config_flow()
            .step_user(Some(UserInput::new(ADDR, "pw")))
            .await
            .unwrap()
        else {
            panic!("expected entry");
        };
        session.clear_calls();

        let (a, b) = tokio::join!(
            integration.setup(&entry.entry_id),
            integration.setup(&entry.entry_id)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(session.connect_count(), 1);
        assert_eq!(session.subscriber_count(), 1);

        integration.unload(&entry.entry_id).await.unwrap();
        assert!(!session.connected());
        assert!(!integration.is_loaded(&entry.entry_id));
    }

    #[tokio::test]
    async fn test_setup_all_skips_failures() {
        let session = Arc::new(MockSession::new());
        let (_dir, integration) = integration(session.clone()).await;
        integration
            .config_flow()
            .step_user(Some(UserInput::new(ADDR, "pw")))
            .await
            .unwrap();

        session.push_connect_outcome(ConnectOutcome::Bluetooth);
        assert_eq!(integration.setup_all().await, 0);
        assert_eq!(integration.setup_all().await, 1);
        assert!(matches!(
            integration.setup("missing").await,
            Err(IntegrationError::EntryNotFound(_))
        ));
    }
}
