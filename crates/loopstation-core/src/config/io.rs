//! YAML persistence shared by the station config and saved loop manifests
//!
//! [`write_yaml`] replaces files atomically so an interrupted save never
//! leaves a half-written manifest behind. [`load_config`] is the lenient
//! reader for settings: anything it cannot use becomes the defaults.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Suffix of the scratch file written next to the target before renaming
const PARTIAL_SUFFIX: &str = "partial";

/// Parse a YAML file, reporting which file was at fault
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))?;
    serde_yaml::from_str(&text).with_context(|| format!("{:?} is not valid YAML for this file", path))
}

/// Serialize `value` to `path`, creating parent directories
pub fn write_yaml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(value).context("Cannot encode YAML")?;

    let partial = path.with_extension(PARTIAL_SUFFIX);
    std::fs::write(&partial, yaml).with_context(|| format!("Cannot write {:?}", partial))?;
    std::fs::rename(&partial, path).with_context(|| format!("Cannot replace {:?}", path))?;
    log::debug!("Wrote {:?}", path);
    Ok(())
}

/// Station settings from `path`, or the defaults when the file is missing
/// or unusable
///
/// ```ignore
/// let config: StationConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No station settings at {:?}; starting from defaults", path);
        return T::default();
    }
    match read_yaml(path) {
        Ok(config) => {
            log::info!("Station settings loaded from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring station settings ({:#}); starting from defaults", e);
            T::default()
        }
    }
}
