//! gRPC interceptors recording call metrics

pub mod layer;
pub mod metrics;

pub use layer::{InstrumentedBody, StatsdLayer, StatsdService};
pub use metrics::{
    stream_server_interceptor, unary_server_interceptor, CallSpan, MethodInfo, MetricsInterceptor,
    StreamServerInterceptor, UnaryServerInterceptor,
};
