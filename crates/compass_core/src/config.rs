use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::kv::MAX_DOCUMENT_BYTES;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompassConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub sos: SosConfig,
}

/// Where the COMPASS server lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `X-Client`
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Sent as `X-Client-Version`
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Whole-request timeout. Unset means transport defaults only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(default = "default_status_initial_delay")]
    pub status_initial_delay_secs: u64,

    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5002".to_string()
}

fn default_client_name() -> String {
    "COMPASS-CLI".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_status_initial_delay() -> u64 {
    2
}

fn default_status_poll_interval() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            request_timeout_secs: None,
            status_initial_delay_secs: default_status_initial_delay(),
            status_poll_interval_secs: default_status_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per stored key
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("compass")
}

fn default_max_document_bytes() -> usize {
    MAX_DOCUMENT_BYTES
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Dialled when no number can be found in the emergency contact
    #[serde(default = "default_emergency_number")]
    pub emergency_number: String,

    /// Command used to open `sms:` and `tel:` URIs
    #[serde(default = "default_opener")]
    pub opener: String,
}

fn default_emergency_number() -> String {
    "911".to_string()
}

fn default_opener() -> String {
    if cfg!(target_os = "macos") {
        "open".to_string()
    } else {
        "xdg-open".to_string()
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            emergency_number: default_emergency_number(),
            opener: default_opener(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosConfig {
    /// Hold-to-confirm countdown before an alert goes out
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
}

fn default_countdown_secs() -> u64 {
    3
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
        }
    }
}

/// Load configuration from a TOML file
pub async fn load_config(path: &Path) -> Result<CompassConfig> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        CoreError::configuration(path.display().to_string(), "file", "readable TOML file", e)
    })?;

    toml::from_str(&content).map_err(|e| {
        CoreError::configuration(
            path.display().to_string(),
            "content",
            "valid TOML configuration",
            e,
        )
    })
}

/// Save configuration to a TOML file, creating parent directories
pub async fn save_config(config: &CompassConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CoreError::configuration(
                parent.display().to_string(),
                "directory",
                "writable directory",
                e,
            )
        })?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| {
        CoreError::configuration(
            path.display().to_string(),
            "serialization",
            "serializable config structure",
            e,
        )
    })?;

    tokio::fs::write(path, content).await.map_err(|e| {
        CoreError::configuration(
            path.display().to_string(),
            "file",
            "writable file location",
            e,
        )
    })?;

    Ok(())
}

/// Candidate config files, most specific first
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("compass.toml")];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("compass").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".compass").join("config.toml"));
    }

    paths
}

/// Load the first config file that exists, or the defaults
pub async fn load_config_from_standard_locations() -> Result<CompassConfig> {
    for path in config_paths() {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            return load_config(&path).await;
        }
    }

    Ok(CompassConfig::default())
}

/// Overlay where every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub opener: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_secs: Option<u64>,
}

pub fn merge_configs(base: CompassConfig, overlay: PartialConfig) -> CompassConfig {
    CompassConfig {
        server: ServerConfig {
            base_url: overlay.base_url.unwrap_or(base.server.base_url),
            request_timeout_secs: overlay
                .request_timeout_secs
                .or(base.server.request_timeout_secs),
            ..base.server
        },
        storage: StorageConfig {
            path: overlay.storage_path.unwrap_or(base.storage.path),
            ..base.storage
        },
        fallback: FallbackConfig {
            emergency_number: overlay
                .emergency_number
                .unwrap_or(base.fallback.emergency_number),
            opener: overlay.opener.unwrap_or(base.fallback.opener),
        },
        sos: SosConfig {
            countdown_secs: overlay.countdown_secs.unwrap_or(base.sos.countdown_secs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = CompassConfig::default();
        assert_eq!(config.server.base_url, "http://localhost:5002");
        assert_eq!(config.server.status_poll_interval_secs, 300);
        assert_eq!(config.server.request_timeout_secs, None);
        assert_eq!(config.storage.max_document_bytes, 5_000_000);
        assert_eq!(config.fallback.emergency_number, "911");
        assert_eq!(config.sos.countdown_secs, 3);
    }

    #[test]
    fn test_config_serialization() {
        let config = CompassConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[fallback]"));
        assert!(toml.contains("[sos]"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: CompassConfig = toml::from_str(
            r#"
            [server]
            base_url = "https://coach.example.org"
            request_timeout_secs = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.server.base_url, "https://coach.example.org");
        assert_eq!(config.server.request_timeout_secs, Some(15));
        assert_eq!(config.server.status_initial_delay_secs, 2);
        assert_eq!(config.sos, SosConfig::default());
    }

    #[test]
    fn test_merge_overlay() {
        let overlay = PartialConfig {
            base_url: Some("http://10.0.0.2:5002".to_string()),
            countdown_secs: Some(5),
            ..Default::default()
        };
        let merged = merge_configs(CompassConfig::default(), overlay);
        assert_eq!(merged.server.base_url, "http://10.0.0.2:5002");
        assert_eq!(merged.server.client_name, "COMPASS-CLI");
        assert_eq!(merged.sos.countdown_secs, 5);
        assert_eq!(merged.fallback.emergency_number, "911");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CompassConfig::default();
        config.fallback.emergency_number = "112".to_string();
        save_config(&config, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[server\nbase_url = ").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConfigurationError { ref field, .. } if field == "content"
        ));
    }
}
