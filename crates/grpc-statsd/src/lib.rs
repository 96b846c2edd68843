//! StatsD metrics for gRPC servers
//!
//! This crate times every gRPC call handled by a tonic server and reports it
//! to a StatsD / DogStatsD agent as a timing sample tagged with the service,
//! method and status code of the call:
//!
//! ```text
//! grpc_middleware:12|ms|#grpc.service:foo.Bar,grpc.method:Baz,grpc.code:OK
//! ```
//!
//! Install [`StatsdLayer`] on a tonic server, or wrap handlers directly with
//! [`unary_server_interceptor`] and [`stream_server_interceptor`].

pub mod code;
pub mod error;
pub mod interceptors;
pub mod options;
pub mod sink;
pub mod stats;

pub use code::{code_name, DefaultErrorToCode, ErrorToCode};
pub use error::{SinkError, SinkResult};
pub use interceptors::{
    stream_server_interceptor, unary_server_interceptor, CallSpan, MethodInfo, MetricsInterceptor,
    StatsdLayer, StatsdService, StreamServerInterceptor, UnaryServerInterceptor,
};
pub use options::{Options, ResolvedOptions, DEFAULT_METRIC_NAME};
pub use sink::{udp_client, StatsdSinkConfig, TimingSink};
pub use stats::{split_full_method, GrpcStats};
