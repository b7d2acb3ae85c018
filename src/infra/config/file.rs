use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;

use crate::domain::entities::config::AppConfig;

pub const CONFIG_ENV_VAR: &str = "GRIDPATCH_CONFIG";

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "gridpatch", "gridpatch")
        .ok_or_else(|| anyhow!("unable to resolve project directories"))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// Reads the config file; a missing file yields the empty default config.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}
