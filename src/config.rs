use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Client configuration persisted as pretty JSON under `~/.ftpilot`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Where download workers write retrieved files.
    pub downloads_dir: PathBuf,
    /// Where the last successful login is stored (see `creds`).
    pub session_file_path: PathBuf,
}

impl Config {
    /// Load the configuration, creating the storage directory and a default
    /// file on first run. A corrupt config file is backed up and replaced
    /// with defaults rather than failing startup.
    pub fn init() -> Result<Self> {
        let home = dirs::home_dir().context("cannot find user's home dir")?;
        let storage_dir = home.join(".".to_owned() + env!("CARGO_PKG_NAME"));
        let config_path = storage_dir.join("config.json");

        if !storage_dir.exists() {
            std::fs::create_dir_all(&storage_dir)
                .with_context(|| format!("cannot create {}", storage_dir.display()))?;
        }
        if !config_path.exists() {
            let config = Self::default_layout(&storage_dir);
            config.save_to(&config_path)?;
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("cannot read {}", config_path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(config) => Ok(config),
            Err(e) => {
                // Keep the broken file around for inspection, then start over.
                let backup = storage_dir
                    .join(format!("config_{}.json", chrono::Utc::now().format("%Y%m%d_%H%M%S")));
                tracing::warn!(
                    "config.json is not parseable ({}); backing up to {} and using defaults",
                    e,
                    backup.display()
                );
                let _ = std::fs::copy(&config_path, &backup);
                let config = Self::default_layout(&storage_dir);
                config.save_to(&config_path)?;
                Ok(config)
            }
        }
    }

    fn default_layout(storage_dir: &std::path::Path) -> Self {
        let downloads_dir = dirs::download_dir()
            .unwrap_or_else(|| storage_dir.join("downloads"));
        Self { downloads_dir, session_file_path: storage_dir.join("session.bin") }
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        let pretty = serde_json::to_string_pretty(self)?;
        std::fs::write(path, pretty)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}
