//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/genpipe/config.toml)
//! 3. Project config (.genpipe/config.toml)
//! 4. Environment variables (GENPIPE_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
