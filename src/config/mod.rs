use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::clamav::ClamAVConnection;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub clamav: ClamAVConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(Error::Config(format!("Invalid log format: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClamAVConfig {
    pub socket_path: Option<String>,
    pub tcp_host: Option<String>,
    pub tcp_port: Option<u16>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// clamscan report to follow; unset when clamscan is not used.
    pub path: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:9810".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ClamAVConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            tcp_host: Some("localhost".to_string()),
            tcp_port: Some(3310),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.connection()?;

        if self.clamav.tcp_port == Some(0) {
            return Err(Error::Config("tcp_port must not be 0".to_string()));
        }

        if self.clamav.timeout_seconds == 0 {
            return Err(Error::Config(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.report.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        self.listen_addr()?;

        let level = self.exporter.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level: {}",
                self.exporter.log_level
            )));
        }

        if let Some(path) = &self.report.path {
            if !path.is_empty() && !Path::new(path).exists() {
                tracing::warn!("Report file does not exist yet: {}", path);
            }
        }

        Ok(())
    }

    /// Unix socket wins over TCP when both are configured.
    pub fn connection(&self) -> Result<ClamAVConnection> {
        if let Some(path) = &self.clamav.socket_path {
            Ok(ClamAVConnection::Unix { path: path.clone() })
        } else if let (Some(host), Some(port)) = (&self.clamav.tcp_host, self.clamav.tcp_port) {
            Ok(ClamAVConnection::Tcp {
                host: host.clone(),
                port,
            })
        } else {
            Err(Error::Config(
                "Either socket_path or tcp_host/tcp_port must be configured".to_string(),
            ))
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.exporter.listen.parse().map_err(|e| {
            Error::Config(format!(
                "Invalid listen address '{}': {}",
                self.exporter.listen, e
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.clamav.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.report.poll_interval_ms)
    }

    /// Report path, empty when no report is configured.
    pub fn report_path(&self) -> &str {
        self.report.path.as_deref().unwrap_or_default()
    }
}
