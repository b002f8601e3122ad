//! Runtime configuration
//!
//! Values resolve in order: defaults, then the TOML config file, then
//! `CONVERGE_<KEY>` environment overrides. Integer keys fail loudly on
//! non-integer strings instead of falling back silently.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Which transport the runtime speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Local,
    Tcp,
}

impl TransportKind {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "local" => Ok(Self::Local),
            "tcp" => Ok(Self::Tcp),
            other => bail!("unknown transport {other:?} (expected \"local\" or \"tcp\")"),
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub agents: usize,
    pub pool_id: Option<String>,
    pub discovery_store: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::Local,
            host: "127.0.0.1".to_string(),
            port: 7400,
            agents: 1,
            pool_id: None,
            discovery_store: None,
        }
    }
}

/// Raw file form; every key optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    transport: Option<TransportKind>,
    host: Option<String>,
    port: Option<u16>,
    agents: Option<usize>,
    pool_id: Option<String>,
    discovery_store: Option<String>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("CONVERGE_{}", key.to_uppercase())).ok()
}

impl Config {
    /// Load configuration from an optional TOML file plus env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let file: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            if let Some(transport) = file.transport {
                config.transport = transport;
            }
            if let Some(host) = file.host {
                config.host = host;
            }
            if let Some(port) = file.port {
                config.port = port;
            }
            if let Some(agents) = file.agents {
                config.agents = agents;
            }
            if file.pool_id.is_some() {
                config.pool_id = file.pool_id;
            }
            if file.discovery_store.is_some() {
                config.discovery_store = file.discovery_store;
            }
        }

        if let Some(value) = env_var("transport") {
            config.transport = TransportKind::parse(&value)?;
        }
        if let Some(value) = env_var("host") {
            config.host = value;
        }
        if let Some(value) = env_var("port") {
            config.port = value
                .parse()
                .with_context(|| format!("CONVERGE_PORT is not an integer: {value:?}"))?;
        }
        if let Some(value) = env_var("agents") {
            config.agents = value
                .parse()
                .with_context(|| format!("CONVERGE_AGENTS is not an integer: {value:?}"))?;
        }
        if let Some(value) = env_var("pool_id") {
            config.pool_id = Some(value);
        }
        if let Some(value) = env_var("discovery_store") {
            config.discovery_store = Some(value);
        }

        if config.agents == 0 {
            bail!("agents must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.transport, TransportKind::Local);
        assert_eq!(config.agents, 1);
        assert_eq!(config.port, 7400);
    }

    #[test]
    fn test_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "transport = \"tcp\"\nport = 9100\nagents = 3\npool_id = \"P\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.port, 9100);
        assert_eq!(config.agents, 3);
        assert_eq!(config.pool_id.as_deref(), Some("P"));
    }

    #[test]
    fn test_bad_port_in_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not-a-number\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_zero_agents_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agents = 0").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }
}
