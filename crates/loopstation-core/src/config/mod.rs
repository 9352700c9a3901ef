//! Configuration: station settings, YAML I/O and default paths

mod io;
mod paths;
mod station;

pub use io::{load_config, read_yaml, write_yaml};
pub use paths::{default_config_dir, default_config_path, default_recordings_dir};
pub use station::StationConfig;
