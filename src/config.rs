//! TOML configuration.
//!
//! ```toml
//! [identity]
//! tenant_id = "household"
//! user_id = "alex"
//!
//! [storage]
//! data_file = "/home/alex/.local/share/focusdeck/focusdeck.json"
//!
//! [schedule]
//! list_back_days = 7
//! list_forward_days = 14
//! min_block_minutes = 15
//! materialize_days = 14
//!
//! [cockpit]
//! horizon_hours = 24
//! max_blocks = 12
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Scope;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub cockpit: CockpitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub tenant_id: String,
    pub user_id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_string(),
            user_id: std::env::var("USER").unwrap_or_else(|_| "me".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Store file. `None` falls back to `FOCUSDECK_DB` or the data directory.
    pub data_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Default block listing window, days before now.
    pub list_back_days: i64,
    /// Default block listing window, days after now.
    pub list_forward_days: i64,
    /// Floor applied to a task's duration when it is synced from a block.
    pub min_block_minutes: u32,
    /// Default materialization horizon from today.
    pub materialize_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            list_back_days: 7,
            list_forward_days: 14,
            min_block_minutes: 15,
            materialize_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CockpitConfig {
    pub horizon_hours: i64,
    pub max_blocks: usize,
}

impl Default for CockpitConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            max_blocks: 12,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds a negative day or hour count.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects negative windows and horizons. Values too large for the
    /// calendar are caught where they are used.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("schedule.list_back_days", self.schedule.list_back_days),
            ("schedule.list_forward_days", self.schedule.list_forward_days),
            ("schedule.materialize_days", self.schedule.materialize_days),
            ("cockpit.horizon_hours", self.cockpit.horizon_hours),
        ];
        for (key, value) in counts {
            if value < 0 {
                return Err(Error::Config(format!("{} must not be negative, got {}", key, value)));
            }
        }
        Ok(())
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/focusdeck/config.toml`.
    pub fn default_config_path() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("focusdeck");
        p.push("config.toml");
        p
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.identity.tenant_id.clone(), self.identity.user_id.clone())
    }

    /// `FOCUSDECK_DB` wins over the configured file.
    pub fn data_file(&self) -> PathBuf {
        if let Some(p) = std::env::var_os("FOCUSDECK_DB") {
            return PathBuf::from(p);
        }
        self.storage
            .data_file
            .clone()
            .unwrap_or_else(crate::storage::default_db_path)
    }
}
