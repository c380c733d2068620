use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::external::ElasticConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl LoggingConfig {
    /// Directive for the log filter; `DEBUG=true` wins over `LOG_LEVEL`
    pub fn filter(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub elastic: ElasticConfig,
    pub logging: LoggingConfig,
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = ElasticConfig::default();

        // Load Elasticsearch config
        let elastic = ElasticConfig {
            node: non_empty_var("ES_NODE").unwrap_or(defaults.node),
            username: non_empty_var("ES_USERNAME"),
            password: non_empty_var("ES_PASSWORD"),
            index: non_empty_var("ES_INDEX").unwrap_or(defaults.index),
        };
        elastic.get_url()?;

        // Load logging config
        let debug = env::var("DEBUG")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let logging = LoggingConfig {
            log_level: if debug {
                "debug".to_string()
            } else {
                env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
            },
        };

        Ok(Self { elastic, logging })
    }
}
