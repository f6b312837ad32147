//! Store configuration, loaded from `stacks.toml` in the store directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up inside the store directory.
pub const CONFIG_FILE_NAME: &str = "stacks.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Owning user, stamped onto rows at sync time.
    #[serde(default)]
    pub user_id: String,

    /// This device's identifier, carried on every event it records.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// App identifier for event provenance.
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Grace window for delayed task completion, in seconds.
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            device_id: default_device_id(),
            app_id: default_app_id(),
            grace_window_secs: default_grace_window_secs(),
        }
    }
}

impl StoreConfig {
    /// The grace window as a [`Duration`].
    #[must_use]
    pub const fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }
}

fn default_device_id() -> String {
    "local".to_string()
}

fn default_app_id() -> String {
    "app.stacks.core".to_string()
}

const fn default_grace_window_secs() -> u64 {
    5
}

/// Load the config from `<store_dir>/stacks.toml`. A missing file yields
/// the defaults; a malformed file is an error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_store_config(store_dir: &Path) -> Result<StoreConfig> {
    let path = store_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    toml::from_str::<StoreConfig>(&content)
        .with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{StoreConfig, load_store_config};
    use std::time::Duration;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_store_config(dir.path()).expect("load");
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.grace_window(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("stacks.toml"),
            "device_id = \"phone-1\"\ngrace_window_secs = 10\n",
        )
        .expect("write");

        let config = load_store_config(dir.path()).expect("load");
        assert_eq!(config.device_id, "phone-1");
        assert_eq!(config.grace_window_secs, 10);
        assert_eq!(config.app_id, "app.stacks.core");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("stacks.toml"), "device_id = [broken").expect("write");
        assert!(load_store_config(dir.path()).is_err());
    }
}
