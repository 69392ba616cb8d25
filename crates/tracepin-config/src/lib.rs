//! Configuration types and loading for tracepin
//!
//! This crate provides:
//! - Configuration structures for all tracepin components
//! - Config file loading (TOML format) and validation
//!
//! # Architecture
//!
//! Configuration is an **infrastructure concern** and lives outside the domain layer.
//! It depends on `tracepin-core` only for `CaptureBounds`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracepin_config::{Config, load_config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tracepin.toml"))?;
//! println!("Service: {}", config.service.name);
//! ```

mod loader;

// Default constants for all configuration values
pub mod constants;

// Config modules - organized by domain
mod capture;
mod instrumentation;
mod notifier;

mod types;

pub use loader::{
    load_config, load_config_from_str, resolve_config_path, ConfigError, DEFAULT_CONFIG,
};
pub use types::*;
