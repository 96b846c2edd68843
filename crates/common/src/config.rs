//! Configuration management for services using the statsd interceptor.
//!
//! Settings are loaded from configuration files and environment variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 50051
//!
//! [statsd]
//! host = "127.0.0.1"
//! port = 8125
//! prefix = "checkout"
//!
//! [middleware]
//! metric_name = "grpc_middleware"
//!
//! [telemetry]
//! service_name = "checkout"
//! json_logging = true
//! log_level = "info"
//! ```

use anyhow::{Context, Result};
use grpc_statsd::{Options, StatsdSinkConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Statsd agent the interceptor reports to
    #[serde(default)]
    pub statsd: StatsdSinkConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Interceptor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Metric name; empty means the interceptor default
    #[serde(default)]
    pub metric_name: String,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_service_name() -> String {
    "grpc-statsd".to_string()
}

fn default_json_logging() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: default_json_logging(),
            log_level: default_log_level(),
        }
    }
}

impl MiddlewareConfig {
    /// Interceptor options for this configuration
    pub fn options(&self) -> Options {
        Options::new().with_metric_name(self.metric_name.clone())
    }
}

impl AppConfig {
    /// Load configuration from environment variables and configuration files.
    ///
    /// The configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from APP_ENV)
    /// 4. Environment variables (prefixed with GRPC_STATSD_)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use grpc_statsd_common::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load configuration");
    /// println!("Reporting to {}:{}", config.statsd.host, config.statsd.port);
    /// ```
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Example: GRPC_STATSD__STATSD__PORT=9125
            .add_source(
                config::Environment::with_prefix("GRPC_STATSD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.statsd.host.is_empty() {
            anyhow::bail!("Statsd host is required");
        }

        if self.statsd.port == 0 {
            anyhow::bail!("Statsd port must be greater than 0");
        }

        if self.statsd.queue_size == 0 {
            anyhow::bail!("Statsd queue size must be greater than 0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Address the gRPC server binds to
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .context("Invalid server address")
    }

    /// Create a development configuration with sensible defaults
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 50051,
            },
            statsd: StatsdSinkConfig::default(),
            middleware: MiddlewareConfig::default(),
            telemetry: TelemetryConfig {
                service_name: "grpc-statsd-dev".to_string(),
                json_logging: false,
                log_level: "debug".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.server.port, 50051);
        assert_eq!(config.statsd.port, 8125);
        assert!(config.middleware.metric_name.is_empty());
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(
            r#"
            [statsd]
            host = "dd-agent"
            port = 9125
            prefix = "checkout"

            [middleware]
            metric_name = "rpc.latency"
            "#,
        )
        .unwrap();

        assert_eq!(config.statsd.host, "dd-agent");
        assert_eq!(config.statsd.port, 9125);
        assert_eq!(config.statsd.prefix, "checkout");
        assert_eq!(config.middleware.options().metric_name, "rpc.latency");
    }

    #[test]
    fn test_invalid_log_level() {
        let result = AppConfig::from_toml(
            r#"
            [telemetry]
            log_level = "verbose"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_addr() {
        let addr = AppConfig::development().server_addr().unwrap();
        assert_eq!(addr.port(), 50051);
        assert!(addr.ip().is_loopback());
    }
}
