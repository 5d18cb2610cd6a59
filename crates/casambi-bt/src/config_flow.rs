//! Pairing and re-authentication wizard
//!
//! Each step either shows a form, creates an entry or aborts. Forms carry the
//! values to suggest and at most one error key; the host renders them.

use crate::config::{ConfigEntry, EntryData, EntryStore};
use crate::error::IntegrationError;
use crate::integration::SessionFactory;
use casambi_protocol::{format_mac, Advertisement, BluetoothHost, ProtocolError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Length of an upper-case colon separated MAC
const MAC_LENGTH: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    User,
    Bluetooth,
    BluetoothError,
    Reauth,
    ReauthConfirm,
}

/// Error key shown on a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    CannotConnect,
    InvalidAuth,
    InvalidAddress,
    Unknown,
}

impl FlowError {
    #[must_use] pub fn as_str(&self) -> &'static str {
        match self {
            FlowError::CannotConnect => "cannot_connect",
            FlowError::InvalidAuth => "invalid_auth",
            FlowError::InvalidAddress => "invalid_address",
            FlowError::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
    ReauthSuccessful,
    NotConnectable,
    BluetoothError,
}

/// Values entered on the user form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInput {
    pub address: String,
    pub password: String,
    pub import_groups: bool,
}

impl UserInput {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            import_groups: true,
        }
    }
}

/// Outcome of a flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    ShowForm {
        step: FlowStep,
        suggested_address: Option<String>,
        error: Option<FlowError>,
    },
    CreateEntry {
        entry: ConfigEntry,
    },
    Abort {
        reason: AbortReason,
        /// Entry the host should reload
        reload_entry: Option<String>,
    },
}

impl FlowResult {
    fn form(step: FlowStep) -> Self {
        FlowResult::ShowForm {
            step,
            suggested_address: None,
            error: None,
        }
    }

    fn abort(reason: AbortReason) -> Self {
        FlowResult::Abort {
            reason,
            reload_entry: None,
        }
    }
}

/// Normalize an address to an upper-case colon separated MAC
#[must_use] pub fn normalize_address(address: &str) -> String {
    format_mac(address.trim()).to_uppercase()
}

/// What a successful validation learned about the network
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetworkInfo {
    title: String,
    unique_id: String,
}

/// One run of the wizard
pub struct ConfigFlow<'a> {
    store: &'a EntryStore,
    host: Arc<dyn BluetoothHost>,
    session_factory: SessionFactory,
    discovery: Option<Advertisement>,
    reauth_entry: Option<ConfigEntry>,
}

impl<'a> ConfigFlow<'a> {
    pub fn new(
        store: &'a EntryStore,
        host: Arc<dyn BluetoothHost>,
        session_factory: SessionFactory,
    ) -> Self {
        Self {
            store,
            host,
            session_factory,
            discovery: None,
            reauth_entry: None,
        }
    }

    /// Connect once with the given credentials and disconnect again
    async fn validate_input(&self, address: &str, password: &str) -> Result<NetworkInfo, FlowError> {
        let Some(device) = self.host.device_from_address(address, true) else {
            return Err(FlowError::CannotConnect);
        };

        let session = (self.session_factory)();
        let result = async {
            session.invalidate_cache(&device.address).await?;
            session.connect(&device, password).await?;
            let name = session.network_name();
            // Setup opens its own session afterwards
            session.disconnect().await?;
            Ok::<String, ProtocolError>(name)
        }
        .await;

        match result {
            Ok(title) => Ok(NetworkInfo {
                title,
                unique_id: address.to_string(),
            }),
            Err(ProtocolError::NetworkNotFound) => Err(FlowError::CannotConnect),
            Err(ProtocolError::Authentication) => Err(FlowError::InvalidAuth),
            Err(e) => {
                tracing::error!("Unexpected exception validating {}: {}", address, e);
                Err(FlowError::Unknown)
            }
        }
    }

    /// Create the entry, or update the one already holding this address
    async fn create_entry(
        &self,
        info: NetworkInfo,
        data: EntryData,
    ) -> Result<FlowResult, IntegrationError> {
        if let Some(existing) = self.store.find_by_unique_id(&info.unique_id) {
            let changed = self
                .store
                .update(&existing.entry_id, Some(info.title), data)
                .await?;
            if !changed {
                return Ok(FlowResult::abort(AbortReason::AlreadyConfigured));
            }
            return Ok(FlowResult::Abort {
                reason: AbortReason::ReauthSuccessful,
                reload_entry: Some(existing.entry_id),
            });
        }

        let entry = ConfigEntry::new(info.title, data);
        self.store.add(entry.clone()).await?;
        Ok(FlowResult::CreateEntry { entry })
    }

    /// Entry of network information
    pub async fn step_user(
        &mut self,
        input: Option<UserInput>,
    ) -> Result<FlowResult, IntegrationError> {
        let suggested_address = self.discovery.as_ref().map(|d| d.address.clone());

        if self.host.scanner_count(true) < 1 {
            return Ok(FlowResult::form(FlowStep::BluetoothError));
        }

        let Some(mut input) = input else {
            return Ok(FlowResult::ShowForm {
                step: FlowStep::User,
                suggested_address,
                error: None,
            });
        };

        input.address = normalize_address(&input.address);

        let error = if input.address.len() == MAC_LENGTH {
            match self.validate_input(&input.address, &input.password).await {
                Ok(info) => {
                    let data = EntryData {
                        address: input.address,
                        password: input.password,
                        import_groups: input.import_groups,
                    };
                    return self.create_entry(info, data).await;
                }
                Err(e) => e,
            }
        } else {
            FlowError::InvalidAddress
        };

        Ok(FlowResult::ShowForm {
            step: FlowStep::User,
            suggested_address: Some(input.address),
            error: Some(error),
        })
    }

    /// A network was discovered by the host
    pub fn step_bluetooth(&mut self, discovery: Advertisement) -> FlowResult {
        if !discovery.connectable {
            return FlowResult::abort(AbortReason::NotConnectable);
        }

        let address = normalize_address(&discovery.address);
        if self.store.find_by_unique_id(&address).is_some() {
            return FlowResult::abort(AbortReason::AlreadyConfigured);
        }

        tracing::debug!(
            "Discovery: [{}] {:?} from {}",
            discovery.address,
            discovery.name,
            discovery.source
        );

        self.discovery = Some(discovery);
        FlowResult::form(FlowStep::User)
    }

    /// The flow cannot continue without a connectable scanner
    #[must_use] pub fn step_bluetooth_error(&self) -> FlowResult {
        FlowResult::abort(AbortReason::BluetoothError)
    }

    /// Start re-authentication of an existing entry
    pub fn step_reauth(&mut self, entry_id: &str) -> Result<FlowResult, IntegrationError> {
        let entry = self
            .store
            .get(entry_id)
            .ok_or_else(|| IntegrationError::EntryNotFound(entry_id.to_string()))?;
        self.reauth_entry = Some(entry);
        Ok(FlowResult::form(FlowStep::ReauthConfirm))
    }

    /// Accept a new password for the entry under re-authentication
    pub async fn step_reauth_confirm(
        &mut self,
        password: Option<String>,
    ) -> Result<FlowResult, IntegrationError> {
        let entry = self
            .reauth_entry
            .clone()
            .ok_or_else(|| IntegrationError::EntryNotFound("reauth".to_string()))?;

        let Some(password) = password else {
            return Ok(FlowResult::ShowForm {
                step: FlowStep::ReauthConfirm,
                suggested_address: Some(entry.data.address),
                error: None,
            });
        };

        match self.validate_input(&entry.data.address, &password).await {
            Ok(_) => {
                let data = EntryData {
                    password,
                    ..entry.data.clone()
                };
                self.store.update(&entry.entry_id, None, data).await?;
                Ok(FlowResult::Abort {
                    reason: AbortReason::ReauthSuccessful,
                    reload_entry: Some(entry.entry_id),
                })
            }
            Err(error) => Ok(FlowResult::ShowForm {
                step: FlowStep::ReauthConfirm,
                suggested_address: Some(entry.data.address),
                error: Some(error),
            }),
        }
    }
}
