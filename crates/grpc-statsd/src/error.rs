//! Error module

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to open UDP socket: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Failed to create statsd sink: {0}")]
    Metric(#[from] cadence::MetricError),

    #[error("Invalid statsd agent address: {0}")]
    InvalidAddress(String),
}

pub type SinkResult<T> = Result<T, SinkError>;
