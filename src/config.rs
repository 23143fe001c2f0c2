//! Tunables for the conversation layer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_DB_LOAD_LIMIT: usize = 30;
pub const DEFAULT_DB_PATH: &str = "data/conversations.db";

/// Resolved configuration with defaults and environment overrides applied.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum messages kept in the active window handed to the model.
    pub history_limit: usize,
    /// How many recent raw records to load from storage before healing.
    pub db_load_limit: usize,
    /// SQLite database location.
    pub db_path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            db_load_limit: DEFAULT_DB_LOAD_LIMIT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    history_limit: Option<usize>,
    db_load_limit: Option<usize>,
    db_path: Option<String>,
}

impl HistoryConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let parsed: ConfigFile = toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                config.apply_file(parsed);
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(limit) = file.history_limit {
            self.history_limit = limit;
        }
        if let Some(limit) = file.db_load_limit {
            self.db_load_limit = limit;
        }
        if let Some(path) = file.db_path {
            self.db_path = PathBuf::from(path);
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(limit) = env_usize("ASKARI_HISTORY_LIMIT") {
            self.history_limit = limit;
        }
        if let Some(limit) = env_usize("ASKARI_DB_LOAD_LIMIT") {
            self.db_load_limit = limit;
        }
        if let Ok(path) = std::env::var("ASKARI_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = PathBuf::from(path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            bail!("history_limit must be a positive integer");
        }
        if self.db_load_limit == 0 {
            bail!("db_load_limit must be a positive integer");
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse().ok()
}
