// src/config/mod.rs

//! Configuration loading and validation for cmdstream.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate settings and convert raw sections into typed ones (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, LoggingSection, RawConfigFile, ServerSection, StreamSection};
