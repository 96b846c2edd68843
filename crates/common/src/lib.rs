//! Shared setup for services instrumented with `grpc-statsd`.
//!
//! This crate provides:
//! - Configuration loading (server, statsd agent, interceptor, telemetry)
//! - Tracing subscriber initialization

pub mod config;
pub mod telemetry;

pub use config::{AppConfig, MiddlewareConfig, ServerConfig, TelemetryConfig};
pub use telemetry::{init_from_config, init_tracing};
