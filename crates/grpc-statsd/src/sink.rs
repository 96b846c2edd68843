//! Metrics client seam
//!
//! The interceptor only needs a way to submit one timing sample. Anything
//! implementing [`TimingSink`] can receive them; the cadence statsd client
//! is supported out of the box.

use crate::error::{SinkError, SinkResult};
use cadence::prelude::*;
use cadence::{BufferedUdpMetricSink, QueuingMetricSink, StatsdClient};
use serde::{Deserialize, Serialize};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

/// Receiver of timing samples
pub trait TimingSink: Send + Sync {
    /// Submit one timing sample. Must not block for long and must not fail
    /// visibly: transport errors are the sink's own concern.
    fn timing(&self, name: &str, duration: Duration, tags: &[String], sample_rate: f64);
}

impl TimingSink for StatsdClient {
    fn timing(&self, name: &str, duration: Duration, tags: &[String], sample_rate: f64) {
        // Fractional milliseconds; the cadence timer only carries whole ones
        let millis = duration.as_nanos() as f64 / 1_000_000.0;
        let mut builder = self.histogram_with_tags(name, millis);

        for tag in tags {
            builder = match tag.split_once(':') {
                Some((key, value)) => builder.with_tag(key, value),
                None => builder.with_tag_value(tag),
            };
        }

        builder.with_sampling_rate(sample_rate).send();
    }
}

/// Statsd agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsdSinkConfig {
    /// Agent host
    #[serde(default = "default_host")]
    pub host: String,

    /// Agent UDP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix prepended to every metric name (may be empty)
    #[serde(default)]
    pub prefix: String,

    /// Capacity of the in-memory queue between callers and the socket
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Size of the UDP write buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    cadence::DEFAULT_PORT
}

fn default_queue_size() -> usize {
    4096
}

fn default_buffer_size() -> usize {
    512
}

impl Default for StatsdSinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            prefix: String::new(),
            queue_size: default_queue_size(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Build a statsd client sending over UDP.
///
/// Samples are queued and flushed by a background thread, so submitting a
/// sample never waits on the network.
pub fn udp_client(config: &StatsdSinkConfig) -> SinkResult<StatsdClient> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| SinkError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp_sink = BufferedUdpMetricSink::with_capacity(addr, socket, config.buffer_size)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, config.queue_size);

    debug!(agent = %addr, prefix = %config.prefix, "Created statsd client");

    Ok(StatsdClient::builder(&config.prefix, queuing_sink)
        .with_error_handler(|err| warn!(error = %err, "Failed to send statsd metric"))
        .build())
}
