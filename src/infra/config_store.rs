// ============================================================
// Layer 6 — Config Store
// ============================================================
// Reads models/config.json into an AppConfig and validates it.
//
//   models/
//     config.json          ← default weight paths + hyperparameters
//     params/              ← weight files named in `default`
//       checkpoints/       ← one run directory per training run

use std::{fs, path::PathBuf};

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Default location of the config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "models/config.json";

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read, parse and validate.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let json = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        config.validate()?;

        tracing::info!("Loaded config from '{}'", self.path.display());
        Ok(config)
    }

}
