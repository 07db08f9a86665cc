//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/genpipe/config.toml)
//! 3. Project config (.genpipe/config.toml)
//! 4. Environment variables (GENPIPE_* prefix)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{PipelineError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        let config: Config = figment
            .merge(Self::env_provider())
            .extract()
            .map_err(|e| PipelineError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| PipelineError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Environment overrides: the first `_` after the prefix separates the
    /// section from the key (`GENPIPE_LLM_MAX_TOKENS` → `llm.max_tokens`)
    fn env_provider() -> Env {
        Env::prefixed("GENPIPE_").map(|key| {
            key.as_str()
                .to_ascii_lowercase()
                .replacen('_', ".", 1)
                .into()
        })
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/genpipe/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("genpipe"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".genpipe")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Show current effective configuration
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;
        println!("{}", Self::render(&config, as_json)?);
        Ok(())
    }

    /// Render a configuration as TOML or JSON
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| PipelineError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            PipelineError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_global_config())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Initialize project configuration in the working directory
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::init_project_in(Path::new("."), force)
    }

    /// Initialize project configuration under `root`
    pub fn init_project_in(root: &Path, force: bool) -> Result<PathBuf> {
        let project_dir = root.join(Self::project_dir());
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Generate default global config content (TOML)
    fn default_global_config() -> String {
        r#"# genpipe Global Configuration
# User-wide defaults. Project settings in .genpipe/config.toml override these.

version = "1.0"

# Upstream model settings
[llm]
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.7
max_tokens = 4096
# No request timeout unless set
# timeout_secs = 120
"#
        .to_string()
    }

    /// Generate default project config content (TOML)
    fn default_project_config() -> String {
        r#"# genpipe Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

# One entry per upstream credential. capacity is the number of
# concurrent generation calls the credential may carry.
[[pool.clients]]
identity = "primary"
capacity = 4
api_key_env = "OPENAI_API_KEY"

# Credit refunds for failed jobs
[billing]
enabled = false
# refund_url = "https://billing.example.com/credits/refund"
# token_env = "GENPIPE_BILLING_TOKEN"

[storage]
backend = "sqlite"
database = ".genpipe/jobs.db"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_init_project_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();

        let path = ConfigLoader::init_project_in(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(temp_dir.path().join(".genpipe/config.toml").exists());

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.pool.clients.len(), 1);
        assert_eq!(config.pool.clients[0].identity, "primary");
        assert_eq!(
            config.pool.clients[0].api_key_env.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_init_project_keeps_existing_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let path = ConfigLoader::init_project_in(temp_dir.path(), false).unwrap();
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::init_project_in(temp_dir.path(), false).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("custom"));

        ConfigLoader::init_project_in(temp_dir.path(), true).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("custom"));
    }

    #[test]
    fn test_load_from_file_rejects_invalid_pool() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[[pool.clients]]\nidentity = \"a\"\ncapacity = 0\n",
        )
        .unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_default_global_config_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, ConfigLoader::default_global_config()).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert!(config.llm.timeout_secs.is_none());
    }

    #[test]
    fn test_render_toml() {
        let rendered = ConfigLoader::render(&Config::default(), false).unwrap();
        assert!(rendered.contains("[llm]"));
        assert!(rendered.contains("gpt-4o-mini"));
    }

    #[test]
    fn test_env_override() {
        // SAFETY: This test runs in isolation
        unsafe {
            std::env::set_var("GENPIPE_LLM_MAX_TOKENS", "1234");
        }
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.llm.max_tokens, 1234);
        unsafe {
            std::env::remove_var("GENPIPE_LLM_MAX_TOKENS");
        }
    }
}
