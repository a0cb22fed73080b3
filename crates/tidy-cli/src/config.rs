use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tidy_reconcile::ReconcileConfig;

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidy")
        .join("tasks.db")
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tidy").join("config.toml"))
}

/// Loads the reconciliation config.
///
/// An explicitly requested file must exist. The default location is optional
/// and falls back to built-in defaults when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<ReconcileConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(ReconcileConfig::default()),
        },
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<ReconcileConfig> {
    let config: ReconcileConfig = toml::from_str(contents).context("failed to parse TOML")?;
    config.validate()?;
    Ok(config)
}
