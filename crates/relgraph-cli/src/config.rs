//! Process configuration, loaded from a single YAML file. Config is the
//! first stage of the startup order.

use std::time::Duration;

use serde::Deserialize;

use relgraph_common::{RelGraphError, Result};
use relgraph_source::{Dialect, SecurityPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub dialect: String,
    pub uri: String,
    pub database: Option<String>,
    #[serde(default)]
    pub allow_tables: Vec<String>,
    #[serde(default)]
    pub deny_tables: Vec<String>,
}

impl SourceConfig {
    pub fn dialect(&self) -> Result<Dialect> {
        match self.dialect.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(RelGraphError::ConfigError(format!("unknown source dialect '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphStoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_neo4j_database")]
    pub database: String,
}

fn default_neo4j_database() -> String {
    "neo4j".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_update_interval_secs")]
    pub data_update_interval_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn default_update_interval_secs() -> u64 {
    2
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
            max_connections: default_max_connections(),
            data_update_interval_secs: default_update_interval_secs(),
        }
    }
}

impl RealtimeConfig {
    pub fn data_update_interval(&self) -> Duration {
        Duration::from_secs(self.data_update_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub graph_store: GraphStoreConfig,
    pub rules_path: Option<String>,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(RelGraphError::from)
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let yaml = "\
source:\n\
  dialect: mysql\n\
  uri: mysql://bench@localhost/shop\n\
graph_store:\n\
  uri: bolt://localhost:7687\n\
  user: neo4j\n\
  password: secret\n\
";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.source.dialect().unwrap(), Dialect::MySql);
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let source = SourceConfig {
            dialect: "oracle".to_string(),
            uri: "x".to_string(),
            database: None,
            allow_tables: vec![],
            deny_tables: vec![],
        };
        assert!(source.dialect().is_err());
    }
}
