//! Testing utilities for grpc-statsd
//!
//! This crate provides:
//! - A recording mock of the metrics sink
//! - Fixtures for method paths and handlers with known outcomes
//!
//! # Examples
//!
//! ```
//! use grpc_statsd::MetricsInterceptor;
//! use grpc_statsd_testing::mocks::RecordingSink;
//!
//! let sink = RecordingSink::new();
//! let interceptor = MetricsInterceptor::new(sink.handle(), None);
//! # let _ = interceptor;
//! assert_eq!(sink.timing_count(), 0);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::{RecordedTiming, RecordingSink};
