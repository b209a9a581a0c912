// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for Archon.
//!
//! Two layers:
//! - Static server configuration (port, database URL) resolved once at startup
//!   from CLI arguments, environment, and an optional YAML config file.
//! - Runtime tunables served by [`SettingsCache`], a TTL-cached view over the
//!   settings store that fails open to the process environment.

mod settings;
mod types;

pub use settings::{SettingsCache, SETTINGS_TTL};
pub use types::{ProviderConfig, ServerConfig, ServiceType};

use std::path::Path;

use crate::error::ConfigError;

/// Config file names probed in the working directory, in order.
pub const CONFIG_FILES: &[&str] = &["archon.yaml", ".archon.yaml"];

/// Global config directory under the user's home.
pub const GLOBAL_CONFIG_DIR: &str = ".archon";

/// Path of the global config file, if a home directory exists.
pub fn global_config_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join("config.yaml"))
}

/// Load server configuration: global file, then workspace file, overlaid
/// with environment variables (`ARCHON_SERVER_PORT`, `DATABASE_URL`).
pub fn load_server_config(workspace_root: &Path) -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    if let Some(global) = global_config_path() {
        if global.exists() {
            let raw = std::fs::read_to_string(&global)?;
            config = serde_yaml::from_str(&raw)?;
        }
    }

    for name in CONFIG_FILES {
        let path = workspace_root.join(name);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            config = serde_yaml::from_str(&raw)?;
            break;
        }
    }

    if let Ok(port) = std::env::var("ARCHON_SERVER_PORT") {
        config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
            field: "ARCHON_SERVER_PORT".to_string(),
            message: format!("'{}' is not a valid port", port),
        })?;
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = Some(url);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_server_config(temp.path()).unwrap();
        assert_eq!(config.port, ServerConfig::default().port);
    }

    #[test]
    fn test_load_config_from_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("archon.yaml"),
            "port: 9191\ndatabase_url: postgres://localhost/archon\n",
        )
        .unwrap();

        let config = load_server_config(temp.path()).unwrap();
        assert_eq!(config.port, 9191);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/archon")
        );
    }
}
