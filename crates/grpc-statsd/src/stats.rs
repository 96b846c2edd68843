//! Per-call measurement record

use crate::code::code_name;
use crate::sink::TimingSink;
use std::time::Duration;
use tonic::Code;
use tracing::{debug, warn};

/// Every sample is always sent
pub const SAMPLE_RATE: f64 = 1.0;

/// Measurement of a single finished call
#[derive(Debug, Clone, PartialEq)]
pub struct GrpcStats {
    pub metric_name: String,
    pub service: String,
    pub method: String,
    pub duration: Duration,
    pub code: Code,
}

impl GrpcStats {
    /// Tags attached to the emitted sample
    pub fn to_tags(&self) -> Vec<String> {
        vec![
            format!("grpc.service:{}", self.service),
            format!("grpc.method:{}", self.method),
            format!("grpc.code:{}", code_name(self.code)),
        ]
    }

    /// Emit the measurement. Without a sink this only logs a warning.
    pub fn send(&self, sink: Option<&dyn TimingSink>) {
        let Some(sink) = sink else {
            warn!(
                service = %self.service,
                method = %self.method,
                "statsd sink is not configured, dropping grpc metric"
            );
            return;
        };

        debug!(
            metric = %self.metric_name,
            service = %self.service,
            method = %self.method,
            code = code_name(self.code),
            duration = ?self.duration,
            "Recording gRPC call"
        );

        sink.timing(&self.metric_name, self.duration, &self.to_tags(), SAMPLE_RATE);
    }
}

/// Split a full method path (`/<service>/<method>`) into service and method.
///
/// The service is everything before the last `/` without the leading `/`,
/// the method is the last segment.
pub fn split_full_method(full_method: &str) -> (&str, &str) {
    match full_method.rsplit_once('/') {
        Some((service, method)) => (service.strip_prefix('/').unwrap_or(service), method),
        None => ("", full_method),
    }
}
