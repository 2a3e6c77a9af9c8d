//! Configuration module for Harrow
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use harrow::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Retries per transport: {}", config.engine.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_blocking_indicators, default_captcha_markers, BrowserConfig, Config,
    DetectionConfig, EngineConfig, IdentityConfig, OutputConfig, QueryEntry, SearchConfig,
    SettleMode, TransportPreference,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
