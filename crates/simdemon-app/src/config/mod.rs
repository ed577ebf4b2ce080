//! Configuration file parsing for Simulator Demon
//!
//! Supports `.simdemon/config.toml` project settings.

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings};
pub use types::*;
