use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{FestError, Result};
use crate::services::export::ExportConfig;
use crate::services::id_card::PageConfig;
use crate::services::results::PointsConfig;

pub const CONFIG_FILE_NAME: &str = "festdesk.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FestConfig {
    #[serde(default)]
    pub id_card: PageConfig,
    /// Fallback when the settings collection has no points document.
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl FestConfig {
    pub fn effective_points<'a>(&'a self, stored: Option<&'a PointsConfig>) -> &'a PointsConfig {
        stored.unwrap_or(&self.points)
    }
}

pub fn parse_fest_config(raw: &str) -> Result<FestConfig> {
    toml::from_str::<FestConfig>(raw).map_err(|err| FestError::Config(err.to_string()))
}

pub fn load_fest_config(data_dir: &Path) -> Result<FestConfig> {
    let config_path = data_dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        info!(
            "{} not found in data folder, using defaults: {}",
            CONFIG_FILE_NAME,
            config_path.display()
        );
        return Ok(FestConfig::default());
    }

    let raw = fs::read_to_string(&config_path).map_err(|err| FestError::io(&config_path, err))?;

    let config = parse_fest_config(&raw).map_err(|err| {
        FestError::Config(format!(
            "Failed to parse {}: {}",
            config_path.display(),
            err
        ))
    })?;
    config.id_card.validate()?;
    config.export.validate()?;
    Ok(config)
}
