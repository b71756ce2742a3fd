//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`]. Validation runs on both load and save so a
//! hand-edited file with out-of-range values is rejected at startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

use super::utils::write_atomic;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound,
            _ => {
                warn!("ConfigFile: read {} failed: {}", self.path.display(), e);
                ConfigError::IoError
            }
        })?;
        let cfg: SystemConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("ConfigFile: {} is corrupted: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        cfg.validate()?;
        info!("ConfigFile: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = serde_json::to_vec_pretty(config).map_err(|_| ConfigError::IoError)?;
        write_atomic(&self.path, &bytes).map_err(|e| {
            warn!("ConfigFile: write {} failed: {}", self.path.display(), e);
            ConfigError::IoError
        })?;
        info!("ConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
