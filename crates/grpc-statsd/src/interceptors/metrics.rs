//! Metrics interceptor for gRPC calls

use crate::code::classify;
use crate::options::{Options, ResolvedOptions};
use crate::sink::TimingSink;
use crate::stats::{split_full_method, GrpcStats};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Code, Status};

/// Description of the intercepted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Fully qualified method path, `/<service>/<method>`
    pub full_method: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodInfo {
    pub fn unary(full_method: impl Into<String>) -> Self {
        Self::new(full_method, false, false)
    }

    pub fn client_streaming(full_method: impl Into<String>) -> Self {
        Self::new(full_method, true, false)
    }

    pub fn server_streaming(full_method: impl Into<String>) -> Self {
        Self::new(full_method, false, true)
    }

    pub fn bidi_streaming(full_method: impl Into<String>) -> Self {
        Self::new(full_method, true, true)
    }

    fn new(full_method: impl Into<String>, client_streaming: bool, server_streaming: bool) -> Self {
        Self {
            full_method: full_method.into(),
            client_streaming,
            server_streaming,
        }
    }
}

/// Metrics interceptor.
///
/// Times each call, classifies its outcome and emits one timing sample
/// tagged with the service, method and status code. The handler's result is
/// always returned untouched.
pub struct MetricsInterceptor<E = Status> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    sink: Option<Arc<dyn TimingSink>>,
    options: ResolvedOptions<E>,
}

impl MetricsInterceptor<Status> {
    /// Create a new metrics interceptor for handlers failing with [`Status`]
    pub fn new(sink: Option<Arc<dyn TimingSink>>, options: Option<Options>) -> Self {
        Self::with_resolved(sink, Options::<Status>::resolve(options))
    }
}

impl<E> MetricsInterceptor<E> {
    /// Create a metrics interceptor from already resolved options
    pub fn with_resolved(sink: Option<Arc<dyn TimingSink>>, options: ResolvedOptions<E>) -> Self {
        Self {
            inner: Arc::new(Inner { sink, options }),
        }
    }

    pub fn options(&self) -> &ResolvedOptions<E> {
        &self.inner.options
    }

    /// Start timing a call. The returned span emits exactly once.
    pub fn start(&self, full_method: impl Into<String>) -> CallSpan<E> {
        CallSpan {
            interceptor: self.clone(),
            full_method: full_method.into(),
            start: Instant::now(),
            finished: false,
        }
    }

    /// Intercept a unary call
    pub async fn unary<Req, Res, F, Fut>(
        &self,
        info: &MethodInfo,
        request: Req,
        handler: F,
    ) -> Result<Res, E>
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Res, E>>,
    {
        let span = self.start(info.full_method.as_str());
        let result = handler(request).await;
        span.finish(result.as_ref().err());
        result
    }

    /// Intercept a streaming call. The whole stream lifetime is one span.
    pub async fn stream<S, F, Fut>(&self, info: &MethodInfo, stream: S, handler: F) -> Result<(), E>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let span = self.start(info.full_method.as_str());
        let result = handler(stream).await;
        span.finish(result.as_ref().err());
        result
    }
}

impl<E> Clone for MetricsInterceptor<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for MetricsInterceptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsInterceptor")
            .field("sink", &self.inner.sink.is_some())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// A call being timed.
///
/// Finishing the span emits its measurement. A span dropped before being
/// finished (the call future was cancelled, the client went away) emits
/// with `Canceled`.
pub struct CallSpan<E = Status> {
    interceptor: MetricsInterceptor<E>,
    full_method: String,
    start: Instant,
    finished: bool,
}

impl<E> CallSpan<E> {
    /// Finish the call with the handler's error, if any
    pub fn finish(mut self, err: Option<&E>) -> GrpcStats {
        let code = classify(self.interceptor.inner.options.error_to_code(), err);
        self.emit(code)
    }

    /// Finish the call with an already known code
    pub fn finish_with_code(mut self, code: Code) -> GrpcStats {
        self.emit(code)
    }

    pub fn full_method(&self) -> &str {
        &self.full_method
    }

    fn emit(&mut self, code: Code) -> GrpcStats {
        self.finished = true;

        let duration = self.start.elapsed();
        let (service, method) = split_full_method(&self.full_method);
        let inner = &self.interceptor.inner;

        let stats = GrpcStats {
            metric_name: inner.options.metric_name().to_string(),
            service: service.to_string(),
            method: method.to_string(),
            duration,
            code,
        };
        stats.send(inner.sink.as_deref());
        stats
    }
}

impl<E> Drop for CallSpan<E> {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(Code::Cancelled);
        }
    }
}

impl<E> fmt::Debug for CallSpan<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSpan")
            .field("full_method", &self.full_method)
            .field("start", &self.start)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Unary server interceptor, see [`unary_server_interceptor`]
pub struct UnaryServerInterceptor<E = Status>(MetricsInterceptor<E>);

impl<E> Clone for UnaryServerInterceptor<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> UnaryServerInterceptor<E> {
    pub fn from_interceptor(interceptor: MetricsInterceptor<E>) -> Self {
        Self(interceptor)
    }

    /// Run `handler` on `request`, recording the call
    pub async fn intercept<Req, Res, F, Fut>(
        &self,
        request: Req,
        info: &MethodInfo,
        handler: F,
    ) -> Result<Res, E>
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Res, E>>,
    {
        self.0.unary(info, request, handler).await
    }
}

/// Streaming server interceptor, see [`stream_server_interceptor`]
pub struct StreamServerInterceptor<E = Status>(MetricsInterceptor<E>);

impl<E> Clone for StreamServerInterceptor<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> StreamServerInterceptor<E> {
    pub fn from_interceptor(interceptor: MetricsInterceptor<E>) -> Self {
        Self(interceptor)
    }

    /// Run `handler` over `stream`, recording the whole stream as one call
    pub async fn intercept<S, F, Fut>(&self, stream: S, info: &MethodInfo, handler: F) -> Result<(), E>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.0.stream(info, stream, handler).await
    }
}

/// Returns a new unary server interceptor that sends call timings to statsd
pub fn unary_server_interceptor(
    sink: Option<Arc<dyn TimingSink>>,
    options: Option<Options>,
) -> UnaryServerInterceptor {
    UnaryServerInterceptor(MetricsInterceptor::new(sink, options))
}

/// Returns a new streaming server interceptor that sends stream timings to statsd
pub fn stream_server_interceptor(
    sink: Option<Arc<dyn TimingSink>>,
    options: Option<Options>,
) -> StreamServerInterceptor {
    StreamServerInterceptor(MetricsInterceptor::new(sink, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Captured {
        samples: Mutex<Vec<(String, Duration, Vec<String>)>>,
    }

    impl TimingSink for Captured {
        fn timing(&self, name: &str, duration: Duration, tags: &[String], _sample_rate: f64) {
            self.samples
                .lock()
                .push((name.to_string(), duration, tags.to_vec()));
        }
    }

    fn interceptor(sink: &Arc<Captured>) -> MetricsInterceptor {
        MetricsInterceptor::new(Some(sink.clone() as Arc<dyn TimingSink>), None)
    }

    #[tokio::test]
    async fn test_unary_success() {
        let sink = Arc::new(Captured::default());
        let interceptor = interceptor(&sink);

        let response = interceptor
            .unary(&MethodInfo::unary("/foo.Bar/Baz"), 20, |req: i32| async move {
                Ok::<_, Status>(req * 2)
            })
            .await
            .unwrap();

        assert_eq!(response, 40);
        let samples = sink.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].0, "grpc_middleware");
        assert_eq!(
            samples[0].2,
            vec!["grpc.service:foo.Bar", "grpc.method:Baz", "grpc.code:OK"]
        );
    }

    #[tokio::test]
    async fn test_dropped_span_reports_canceled() {
        let sink = Arc::new(Captured::default());
        let interceptor = interceptor(&sink);

        let span = interceptor.start("/foo.Bar/Baz");
        drop(span);

        let samples = sink.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].2[2], "grpc.code:Canceled");
    }

    #[tokio::test]
    async fn test_finished_span_emits_once() {
        let sink = Arc::new(Captured::default());
        let interceptor = interceptor(&sink);

        let stats = interceptor
            .start("/foo.Bar/Baz")
            .finish(Some(&Status::internal("boom")));

        assert_eq!(stats.code, Code::Internal);
        assert_eq!(stats.service, "foo.Bar");
        assert_eq!(sink.samples.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_handler_future_reports_canceled() {
        let sink = Arc::new(Captured::default());
        let interceptor = interceptor(&sink);

        let info = MethodInfo::unary("/foo.Bar/Slow");
        let call = interceptor.unary(&info, (), |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Status>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), call).await;

        assert!(timed_out.is_err());
        let samples = sink.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].2[1], "grpc.method:Slow");
        assert_eq!(samples[0].2[2], "grpc.code:Canceled");
    }

    #[test]
    fn test_method_info_constructors() {
        let info = MethodInfo::bidi_streaming("/chat.Room/Talk");
        assert!(info.client_streaming && info.server_streaming);

        let info = MethodInfo::unary("/chat.Room/Join");
        assert!(!info.client_streaming && !info.server_streaming);
    }
}
