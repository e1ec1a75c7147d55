//! Configuration loading.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `stockroom.toml` in the working directory, or an explicit file
//! 3. `STOCKROOM__<SECTION>__<KEY>` environment variables
//!    (e.g. `STOCKROOM__STORE__DATABASE_URL`)

use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use stockroom_observability::LogSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub store: StoreSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Required when `backend = "postgres"`.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Reject thresholds unless `minStockLevel <= reorderPoint <= maxStockLevel`.
    pub enforce_ordering: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            enforce_ordering: true,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or an optional `stockroom.toml`) plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("stockroom").required(false),
        };
        Self::build(Config::builder().add_source(file))
    }

    /// Load settings from TOML text plus the environment.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(contents, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            .add_source(Environment::with_prefix("STOCKROOM").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::Message(
                "store.database_url must be set when store.backend = \"postgres\"".to_string(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Message(
                "store.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
