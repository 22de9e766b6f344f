//! Startup configuration, read from flags or the environment.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tally_common::store::{MemoryStore, PgStore, RecordStore, RestStore};

/// Which row store the API writes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Hosted tabular API reached over HTTP
    Rest,
    /// Postgres reached directly
    Postgres,
    /// Process memory, lost on restart
    Memory,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The row store to use
    #[arg(long, value_enum, default_value = "rest", env = "TALLY_BACKEND")]
    pub backend: Backend,

    /// Service URL: the REST base URL or a postgres:// connection string
    #[arg(long, env = "TALLY_SERVICE_URL")]
    pub service_url: Option<String>,

    /// Service key sent to the REST backend
    #[arg(long, env = "TALLY_SERVICE_KEY", hide_env_values = true)]
    pub service_key: Option<String>,

    /// Maximum pooled connections for the postgres backend
    #[arg(long, default_value_t = 8, env = "TALLY_POOL_SIZE")]
    pub pool_size: u32,
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(anyhow!("{name} must be set for this backend")),
    }
}

impl Config {
    /// Open the configured store. Missing credentials are an error, not a fallback.
    ///
    /// # Errors
    /// Returns an error if a required credential is missing or the store cannot be opened.
    pub fn open_store(&self) -> Result<Arc<dyn RecordStore>> {
        match self.backend {
            Backend::Rest => {
                let url = required(self.service_url.as_deref(), "TALLY_SERVICE_URL")?;
                let key = required(self.service_key.as_deref(), "TALLY_SERVICE_KEY")?;
                Ok(Arc::new(RestStore::new(url, key)?))
            }
            Backend::Postgres => {
                let url = required(self.service_url.as_deref(), "TALLY_SERVICE_URL")?;
                Ok(Arc::new(PgStore::connect(url, self.pool_size)?))
            }
            Backend::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("tally_api").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_rest_requires_url_and_key() {
        let config = parse(&["--backend", "rest", "--service-url", "https://rows.example.com"]);
        let err = config.open_store().err().unwrap();
        assert!(err.to_string().contains("TALLY_SERVICE_KEY"));

        let config = parse(&["--backend", "rest", "--service-key", "k"]);
        let err = config.open_store().err().unwrap();
        assert!(err.to_string().contains("TALLY_SERVICE_URL"));
    }

    #[test]
    fn test_rest_with_credentials_opens() {
        let config = parse(&[
            "--backend",
            "rest",
            "--service-url",
            "https://rows.example.com",
            "--service-key",
            "secret",
        ]);
        assert!(config.open_store().is_ok());
    }

    #[test]
    fn test_memory_needs_nothing() {
        let config = parse(&["--backend", "memory"]);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.pool_size, 8);
        assert!(config.open_store().is_ok());
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        assert!(required(Some("   "), "X").is_err());
        assert!(required(None, "X").is_err());
        assert_eq!(required(Some(" v "), "X").unwrap(), "v");
    }
}
