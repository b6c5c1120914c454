//! Client settings, loaded from a JSON file or taken from an unlocked pad
//! database.

use crate::database::{HexBytes, PadInfo};
use crate::decoy::DecoySettings;
use crate::error::{JerichoError, Result};
use crate::network::{GroupIdentifier, GroupKeys, BASE_POLL_INTERVAL, REQUEST_TIMEOUT};
use crate::user::Callsign;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub server_address_and_port: String,
    pub group_identifier: HexBytes,
    pub group_key: HexBytes,
    pub user: Callsign,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub decoys: DecoySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address_and_port: String::new(),
            group_identifier: HexBytes::default(),
            group_key: HexBytes::default(),
            user: Callsign::Alpha,
            request_timeout_secs: REQUEST_TIMEOUT.as_secs(),
            poll_interval_secs: BASE_POLL_INTERVAL.as_secs(),
            decoys: DecoySettings::default(),
        }
    }
}

impl ClientConfig {
    /// Settings carried in an unlocked database, with default timings
    pub fn from_pad_info(info: &PadInfo) -> Self {
        Self {
            server_address_and_port: info.server_address_and_port.clone(),
            group_identifier: info.server_group_identifier.clone(),
            group_key: info.server_group_key.clone(),
            user: info.user,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading client config");
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_address_and_port.trim().is_empty() {
            return Err(JerichoError::InvalidConfig("server address is empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(JerichoError::InvalidConfig("request timeout must be positive".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(JerichoError::InvalidConfig("poll interval must be positive".into()));
        }
        self.decoys.validate()?;
        self.group_keys().map(|_| ())
    }

    pub fn group_keys(&self) -> Result<GroupKeys> {
        let identifier = GroupIdentifier::from_slice(self.group_identifier.as_slice())?;
        GroupKeys::derive(identifier, self.group_key.as_slice())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
