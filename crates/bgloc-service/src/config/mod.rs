//! Configuration file parsing for the location service
//!
//! Supports `config.toml` under the platform config directory, or any path
//! passed explicitly.

pub mod settings;
pub mod types;

pub use settings::{
    default_settings_path, init_settings_file, load_settings, save_settings, CONFIG_FILENAME,
};
pub use types::*;
