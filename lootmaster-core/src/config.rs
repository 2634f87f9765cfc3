use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::Result;

pub const DEFAULT_WORKBOOK: &str = "ErwinLootTable.xlsx";
pub const WORKBOOK_ENV: &str = "LOOTMASTER_WORKBOOK";

/// Settings remembered between runs of either front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub workbook_path: Option<PathBuf>,
    pub last_box: Option<String>,
    pub last_player: Option<String>,
}

pub fn config_path() -> Option<PathBuf> {
    let mut base = dirs::config_dir().or_else(dirs::data_dir)?;
    base.push("LootMaster");
    base.push("config.json");
    Some(base)
}

impl AppConfig {
    /// Never fails: a missing or unreadable file gives the defaults.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => {
                debug!(path = %path.display(), %err, "no saved config");
                return Self::default();
            }
        };
        match serde_json::from_str::<AppConfig>(&data) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring corrupt config");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        match config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| crate::LootError::Config(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Explicit path first, then the remembered one, then the default file
    /// in the working directory.
    pub fn resolve_workbook(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.workbook_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKBOOK))
    }
}
