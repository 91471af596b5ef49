//! Global calstore configuration.

use std::path::{Path, PathBuf};

use ::config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{CalStoreError, CalStoreResult};

static DEFAULT_DATABASE_PATH: &str = "~/.local/share/calstore/calstore.db";
static DEFAULT_TIMEZONE: &str = "UTC";

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn is_default_database_path(p: &PathBuf) -> bool {
    *p == default_database_path()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn is_default_timezone(tz: &String) -> bool {
    tz == DEFAULT_TIMEZONE
}

/// Global configuration at ~/.config/calstore/config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(
        default = "default_database_path",
        skip_serializing_if = "is_default_database_path"
    )]
    pub database_path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_owner: Option<String>,

    /// Timezone given to calendars created from the CLI
    #[serde(default = "default_timezone", skip_serializing_if = "is_default_timezone")]
    pub default_timezone: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_path: default_database_path(),
            default_owner: None,
            default_timezone: default_timezone(),
        }
    }
}

impl StoreConfig {
    pub fn config_path() -> CalStoreResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalStoreError::Config("Could not determine config directory".into()))?
            .join("calstore");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/calstore/config.toml, creating a commented-out default first if missing.
    pub fn load() -> CalStoreResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> CalStoreResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .build()
            .map_err(|e| CalStoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalStoreError::Config(e.to_string()))
    }

    /// Database location with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        let full_path_str =
            shellexpand::tilde(&self.database_path.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    /// Set default_owner if one isn't already configured, saving to `path`.
    /// Returns true if the default was set.
    pub fn set_default_owner_if_unset(&mut self, owner: &str, path: &Path) -> CalStoreResult<bool> {
        if self.default_owner.is_some() {
            return Ok(false);
        }
        self.default_owner = Some(owner.to_string());
        self.save_to(path)?;
        Ok(true)
    }

    pub fn save_to(&self, path: &Path) -> CalStoreResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CalStoreError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| CalStoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalStoreResult<()> {
        let contents = format!(
            "\
# calstore configuration

# Where the calendar database lives:
# database_path = \"{}\"

# Owner used when --owner is not given:
# default_owner = \"alice\"

# Timezone for new calendars:
# default_timezone = \"{}\"
",
            DEFAULT_DATABASE_PATH, DEFAULT_TIMEZONE
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalStoreError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalStoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commented_default_config_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calstore/config.toml");

        StoreConfig::create_default_config(&path).unwrap();
        let config = StoreConfig::load_from(&path).unwrap();

        assert_eq!(config, StoreConfig::default());
        assert!(!config.database_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn saved_values_are_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = StoreConfig {
            database_path: dir.path().join("cal.db"),
            default_owner: Some("alice".into()),
            default_timezone: "Europe/Berlin".into(),
        };
        config.save_to(&path).unwrap();

        assert_eq!(StoreConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn default_owner_is_only_set_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = StoreConfig::default();

        assert!(config.set_default_owner_if_unset("alice", &path).unwrap());
        assert!(!config.set_default_owner_if_unset("bob", &path).unwrap());

        let loaded = StoreConfig::load_from(&path).unwrap();
        assert_eq!(loaded.default_owner.as_deref(), Some("alice"));
    }

    #[test]
    fn defaults_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        StoreConfig::default().save_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.trim().is_empty(), "got: {}", written);
    }
}
