//! Config entries and their store

use crate::constants::DOMAIN;
use crate::error::IntegrationError;
use crate::persistence;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_import_groups() -> bool {
    true
}

/// User supplied connection data of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    /// Upper-case colon separated MAC of the network
    pub address: String,
    pub password: String,
    /// Create entities for groups as well
    #[serde(default = "default_import_groups")]
    pub import_groups: bool,
}

/// A configured Casambi network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    /// Network name at the time of pairing
    pub title: String,
    /// The network address; at most one entry per address
    pub unique_id: String,
    pub data: EntryData,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    pub updated_at: String,
}

impl ConfigEntry {
    /// Create an entry with a fresh id; the address becomes the unique id
    pub fn new(title: impl Into<String>, data: EntryData) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            unique_id: data.address.clone(),
            data,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Replace title and data, returning whether anything changed
    pub fn apply_update(&mut self, title: Option<String>, data: EntryData) -> bool {
        let title = title.unwrap_or_else(|| self.title.clone());
        if title == self.title && data == self.data {
            return false;
        }
        self.title = title;
        self.data = data;
        self.updated_at = chrono::Utc::now().to_rfc3339();
        true
    }
}

/// Persistent collection of config entries
pub struct EntryStore {
    entries: DashMap<String, ConfigEntry>,
    data_path: PathBuf,
}

impl EntryStore {
    /// Open the store below `data_dir`, loading existing entries
    pub async fn open(data_dir: &Path) -> Self {
        let data_path = data_dir.join(DOMAIN).join("entries.json");
        let loaded = match persistence::read_entries(&data_path).await {
            Ok(loaded) => {
                tracing::info!("Loaded {} config entries from {:?}", loaded.len(), data_path);
                loaded
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable config entries at {:?}: {}", data_path, e);
                Vec::new()
            }
        };

        let entries = DashMap::new();
        for entry in loaded {
            entries.insert(entry.entry_id.clone(), entry);
        }
        Self { entries, data_path }
    }

    /// Open the store in `$DATA_DIR` (default `./data`)
    pub async fn open_default() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self::open(&PathBuf::from(data_dir)).await
    }

    #[must_use] pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// All entries, oldest first
    #[must_use] pub fn list(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        entries
    }

    #[must_use] pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    #[must_use] pub fn find_by_unique_id(&self, unique_id: &str) -> Option<ConfigEntry> {
        self.entries
            .iter()
            .find(|r| r.value().unique_id == unique_id)
            .map(|r| r.value().clone())
    }

    pub async fn add(&self, entry: ConfigEntry) -> Result<(), IntegrationError> {
        tracing::info!("Adding config entry {} ({})", entry.title, entry.unique_id);
        self.entries.insert(entry.entry_id.clone(), entry);
        self.save().await
    }

    /// Update an entry, saving only when something changed
    pub async fn update(
        &self,
        entry_id: &str,
        title: Option<String>,
        data: EntryData,
    ) -> Result<bool, IntegrationError> {
        let changed = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| IntegrationError::EntryNotFound(entry_id.to_string()))?;
            entry.apply_update(title, data)
        };

        if changed {
            self.save().await?;
        }
        Ok(changed)
    }

    pub async fn remove(&self, entry_id: &str) -> Result<ConfigEntry, IntegrationError> {
        let (_, entry) = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| IntegrationError::EntryNotFound(entry_id.to_string()))?;
        self.save().await?;
        Ok(entry)
    }

    async fn save(&self) -> Result<(), IntegrationError> {
        let entries = self.list();
        persistence::write_entries(&self.data_path, &entries).await?;
        tracing::debug!("Saved {} config entries to {:?}", entries.len(), self.data_path);
        Ok(())
    }
}
