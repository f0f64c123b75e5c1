// src/config/mod.rs

//! Configuration loading and validation for ralph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply overrides (`loader.rs`).
//! - Validate values and resolve duration strings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve};
pub use model::{ConfigFile, RalphSection, RawConfigFile};
pub use validate::parse_duration;
