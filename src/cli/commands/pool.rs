//! Pool Command
//!
//! Show the configured client pool. Reads configuration only; no provider is
//! built and no credential is read.

use serde::Serialize;

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::config::Config;
use crate::constants::network::DEFAULT_API_BASE;
use crate::types::Result;

#[derive(Debug, Serialize)]
struct ClientRow {
    identity: String,
    capacity: u32,
    api_key_env: Option<String>,
    api_base: String,
}

fn rows(config: &Config) -> Vec<ClientRow> {
    config
        .pool
        .effective_clients()
        .into_iter()
        .map(|entry| ClientRow {
            identity: entry.identity,
            capacity: entry.capacity,
            api_key_env: entry.api_key_env,
            api_base: entry
                .api_base
                .or_else(|| config.llm.api_base.clone())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
        .collect()
}

pub fn run(format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let rows = rows(&ctx.config);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let output = Output::new();
    output.header("Client Pool");
    output.field("Provider", &ctx.config.llm.provider);
    output.field("Model", &ctx.config.llm.model);
    output.field(
        "Capacity",
        rows.iter().map(|r| r.capacity as u64).sum::<u64>(),
    );

    output.section("Clients");
    for row in &rows {
        println!(
            "  {:<16} capacity {:<4} key {:<20} {}",
            row.identity,
            row.capacity,
            row.api_key_env.as_deref().unwrap_or("-"),
            row.api_base
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientEntry;

    #[test]
    fn test_rows_default_to_single_client() {
        let rows = rows(&Config::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identity, "default");
    }

    #[test]
    fn test_rows_inherit_api_base() {
        let mut config = Config::default();
        config.pool.clients = vec![
            ClientEntry {
                identity: "a".to_string(),
                capacity: 2,
                api_key_env: Some("KEY_A".to_string()),
                api_base: None,
            },
            ClientEntry {
                identity: "b".to_string(),
                capacity: 3,
                api_key_env: None,
                api_base: Some("http://localhost:8080/v1".to_string()),
            },
        ];

        let rows = rows(&config);
        assert_eq!(rows[0].api_base, DEFAULT_API_BASE);
        assert_eq!(rows[1].api_base, "http://localhost:8080/v1");
        assert_eq!(rows[1].capacity, 3);
    }
}
