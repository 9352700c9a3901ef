//! Standard locations for loop station files

use std::path::PathBuf;

/// Configuration directory: `<platform config dir>/loopstation`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopstation")
}

/// Station configuration file: `<config dir>/station.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("station.yaml")
}

/// Where recorded takes are written: `~/Music/loopstation`
pub fn default_recordings_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopstation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_file_name() {
        let path = default_config_path();
        assert!(path.ends_with("loopstation/station.yaml"));
    }

    #[test]
    fn test_recordings_dir_ends_with_loopstation() {
        assert!(default_recordings_dir().ends_with("loopstation"));
    }
}
