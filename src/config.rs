use serde::{Deserialize, Serialize};
use anyhow::Result;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9080,
            path: "/tackboard/".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl CollectorConfig {
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> String {
    "::".to_string()
}

fn default_backlog() -> i32 {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            bind_address: default_bind_address(),
            backlog: default_backlog(),
            log_level: default_log_level(),
        }
    }
}

impl ProbeConfig {
    /// Defaults when no file is given, otherwise the file's contents on top of them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_file_config(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn load_file_config(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: ProbeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.get_tracing_level()?;
        self.bind_ip()?;
        if self.backlog <= 0 {
            return Err(anyhow::anyhow!("Invalid backlog: {}", self.backlog));
        }
        Ok(())
    }

    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!("Invalid log level: {}. Valid levels are: trace, debug, info, warn, error", self.log_level))
        }
    }

    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse::<IpAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", self.bind_address, e))
    }
}
