//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/genpipe/) and project (.genpipe/) level configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{network, pool};
use crate::types::{PipelineError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Upstream model settings shared by every pooled client
    pub llm: LlmConfig,

    /// Upstream client pool
    pub pool: PoolConfig,

    /// Credit refund settings
    pub billing: BillingConfig,

    /// Job record storage
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            pool: PoolConfig::default(),
            billing: BillingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PipelineError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PipelineError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == Some(0) {
            return Err(PipelineError::Config(
                "LLM timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(PipelineError::Config("LLM model must not be empty".to_string()));
        }

        if let Some(base) = &self.llm.api_base {
            validate_http_url("llm.api_base", base)?;
        }

        let mut identities = HashSet::new();
        for client in &self.pool.clients {
            if client.identity.trim().is_empty() {
                return Err(PipelineError::Config(
                    "Pool client identity must not be empty".to_string(),
                ));
            }
            if client.capacity == 0 {
                return Err(PipelineError::Config(format!(
                    "Pool client '{}' capacity must be greater than 0",
                    client.identity
                )));
            }
            if !identities.insert(client.identity.as_str()) {
                return Err(PipelineError::Config(format!(
                    "Duplicate pool client identity '{}'",
                    client.identity
                )));
            }
            if let Some(base) = &client.api_base {
                validate_http_url(&format!("pool client '{}' api_base", client.identity), base)?;
            }
        }

        if self.billing.enabled {
            let url = self.billing.refund_url.as_deref().ok_or_else(|| {
                PipelineError::Config(
                    "billing.refund_url is required when billing is enabled".to_string(),
                )
            })?;
            validate_http_url("billing.refund_url", url)?;
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| PipelineError::Config(format!("Invalid {} '{}': {}", field, value, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(PipelineError::Config(format!(
            "Invalid {} scheme '{}'. Only http and https are allowed",
            field, scheme
        ))),
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Default model name, overridable per request
    pub model: String,

    /// Optional request timeout in seconds (unset: no timeout)
    pub timeout_secs: Option<u64>,

    /// Temperature for LLM generation (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Default API base URL for clients that don't set their own
    pub api_base: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: network::DEFAULT_MODEL.to_string(),
            timeout_secs: None,
            temperature: 0.7,
            max_tokens: network::DEFAULT_MAX_TOKENS,
            api_base: None,
        }
    }
}

// =============================================================================
// Pool Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Configured upstream clients
    pub clients: Vec<ClientEntry>,
}

impl PoolConfig {
    /// Configured clients, or a single default client when none are listed
    pub fn effective_clients(&self) -> Vec<ClientEntry> {
        if self.clients.is_empty() {
            vec![ClientEntry::default()]
        } else {
            self.clients.clone()
        }
    }
}

/// One upstream credential and its concurrency capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub identity: String,
    pub capacity: u32,
    /// Environment variable holding this client's API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for ClientEntry {
    fn default() -> Self {
        Self {
            identity: "default".to_string(),
            capacity: pool::DEFAULT_CLIENT_CAPACITY,
            api_key_env: None,
            api_base: None,
        }
    }
}

// =============================================================================
// Billing Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Refund a credit when a job fails
    pub enabled: bool,

    /// Endpoint receiving refund requests
    pub refund_url: Option<String>,

    /// Environment variable holding the bearer token for the refund endpoint
    pub token_env: Option<String>,
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// SQLite database file, relative to the working directory
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database: PathBuf::from(".genpipe/jobs.db"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
