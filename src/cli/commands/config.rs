//! Config Command
//!
//! Manage genpipe configuration.
//!
//! Usage:
//!   genpipe config show [-g] [-f json]
//!   genpipe config path
//!   genpipe config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show configuration
pub fn show(global: bool, format: &str) -> Result<()> {
    if !global {
        return ConfigLoader::show_config(format == "json");
    }

    match ConfigLoader::global_config_path() {
        Some(global_path) if global_path.exists() => {
            let content = std::fs::read_to_string(&global_path)?;
            println!("# Global Config: {}\n", global_path.display());
            println!("{}", content);
        }
        Some(_) => {
            println!("No global config found.");
            println!("Run 'genpipe config init --global' to create one.");
        }
        None => println!("Cannot determine global config directory."),
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize global or project configuration
pub fn init(global: bool, force: bool) -> Result<()> {
    let (scope, config_path) = if global {
        ("global", ConfigLoader::init_global(force)?)
    } else {
        ("project", ConfigLoader::init_project(force)?)
    };

    Output::new().success(&format!("Initialized {} configuration", scope));
    println!("  Config:    {}", config_path.display());
    Ok(())
}
