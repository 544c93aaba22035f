//! questpath-store: Progress persistence backends and configuration.
//!
//! Implements the `ProgressBackend` trait for a flat JSON file and for
//! process memory, and loads `questpath.toml`.

pub mod config;
pub mod json_file;
pub mod memory;

pub use config::{
    create_backend, load_config, load_config_from, BackendConfig, QuestpathConfig,
};
pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
