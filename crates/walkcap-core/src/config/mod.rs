//! Configuration for recording, upload and logging

pub mod file_loader;
pub mod model;

pub use file_loader::{load_from_file, save_to_file};
pub use model::{
    CaptureConfig, LogFormat, LoggingConfig, RecordingConfig, SealPolicy, StoreConfig,
    UploadConfig,
};

use std::path::PathBuf;

/// Directory holding walkcap state (`~/.walkcap`), falling back to the working directory
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".walkcap"))
        .unwrap_or_else(|| PathBuf::from(".walkcap"))
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    default_home().join("config.toml")
}
