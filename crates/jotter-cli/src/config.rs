//! Persistent CLI configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jotter_core::util::{is_http_url, normalize_text_option};
use jotter_core::{OwnerId, SyncConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

/// Settings needed to reach the remote store
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub remote_url: String,
    pub api_token: Option<String>,
    pub owner: OwnerId,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jotter")
        .join(CONFIG_FILE_NAME)
}

impl CliConfig {
    /// Load the config file and apply `JOTTER_*` environment overrides
    pub fn load() -> Result<Self, String> {
        let config = Self::load_from_path(&default_config_path())?;
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self {
                version: default_config_version(),
                ..Self::default()
            });
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Overlay values from `lookup` (normally the process environment)
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        if let Some(url) = normalize_text_option(lookup("JOTTER_REMOTE_URL")) {
            self.remote_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup("JOTTER_API_TOKEN")) {
            self.api_token = Some(token);
        }
        if let Some(owner) = normalize_text_option(lookup("JOTTER_OWNER_ID")) {
            self.owner_id = Some(owner);
        }
        if let Some(raw) = normalize_text_option(lookup("JOTTER_TIMEOUT_SECS")) {
            self.timeout_secs = Some(
                raw.parse()
                    .map_err(|_| format!("JOTTER_TIMEOUT_SECS must be a number, got '{raw}'"))?,
            );
        }
        if let Some(raw) = normalize_text_option(lookup("JOTTER_RETRY_LIMIT")) {
            self.retry_limit = Some(
                raw.parse()
                    .map_err(|_| format!("JOTTER_RETRY_LIMIT must be a number, got '{raw}'"))?,
            );
        }
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.remote_url.as_deref() {
            if !is_http_url(url) {
                return Err(format!("Remote URL must start with http:// or https://: {url}"));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err("Timeout must be at least one second".to_string());
        }
        Ok(())
    }

    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::default();
        if let Some(retry_limit) = self.retry_limit {
            config = config.with_retry_limit(retry_limit);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_remote_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Remote URL and identity, or `None` when sync is not set up
    pub fn remote_settings(&self) -> Result<Option<RemoteSettings>, String> {
        let (Some(remote_url), Some(owner_id)) = (self.remote_url.clone(), self.owner_id.clone())
        else {
            return Ok(None);
        };
        let owner = OwnerId::new(owner_id).map_err(|error| error.to_string())?;

        Ok(Some(RemoteSettings {
            remote_url,
            api_token: self.api_token.clone(),
            owner,
        }))
    }

    fn normalize(&mut self) {
        self.remote_url = normalize_text_option(self.remote_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api_token = normalize_text_option(self.api_token.take());
        self.owner_id = normalize_text_option(self.owner_id.take());
    }
}
