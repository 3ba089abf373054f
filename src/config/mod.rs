//! Configuration module
//!
//! Resolves server settings from defaults, an optional TOML file, environment
//! variables and command-line flags.

mod settings;

pub use settings::*;
