//! Tower layer installing the metrics interceptor into a tonic server
//!
//! ```ignore
//! use grpc_statsd::StatsdLayer;
//! use tonic::transport::Server;
//!
//! Server::builder()
//!     .layer(StatsdLayer::new(Some(sink), None))
//!     .add_service(my_service)
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! Unary and streaming calls are handled the same way: the span starts when
//! the request reaches the layer and ends when the response body delivers its
//! trailers, so a streaming response is measured over its whole lifetime.

use crate::interceptors::metrics::{CallSpan, MetricsInterceptor};
use crate::options::Options;
use crate::sink::TimingSink;
use http::{HeaderMap, Request, Response};
use http_body::{Body, SizeHint};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::{Code, Status};
use tower::{Layer, Service};

/// Layer producing [`StatsdService`]
#[derive(Clone, Debug)]
pub struct StatsdLayer {
    interceptor: MetricsInterceptor,
}

impl StatsdLayer {
    /// Create a new layer sending call timings to `sink`
    pub fn new(sink: Option<Arc<dyn TimingSink>>, options: Option<Options>) -> Self {
        Self::from_interceptor(MetricsInterceptor::new(sink, options))
    }

    pub fn from_interceptor(interceptor: MetricsInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for StatsdLayer {
    type Service = StatsdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatsdService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service timing every gRPC call it forwards
#[derive(Clone, Debug)]
pub struct StatsdService<S> {
    inner: S,
    interceptor: MetricsInterceptor,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StatsdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Body + Send + 'static,
{
    type Response = Response<InstrumentedBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let span = self.interceptor.start(req.uri().path());
        let future = self.inner.call(req);

        Box::pin(async move {
            match future.await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();

                    // Trailers-only responses carry the status in the headers
                    let body = match grpc_outcome(&parts.headers) {
                        Some(outcome) => {
                            span.finish(outcome.as_ref().err());
                            InstrumentedBody::finished(body)
                        }
                        None => InstrumentedBody::new(body, span),
                    };

                    Ok(Response::from_parts(parts, body))
                }
                Err(err) => {
                    span.finish_with_code(Code::Unknown);
                    Err(err)
                }
            }
        })
    }
}

/// Response body finishing the call span once the trailers are seen.
///
/// Dropping the body before that reports the call as `Canceled`.
pub struct InstrumentedBody<B> {
    inner: B,
    span: Option<CallSpan>,
}

impl<B: Body> InstrumentedBody<B> {
    fn new(inner: B, span: CallSpan) -> Self {
        if inner.is_end_stream() {
            span.finish(None);
            return Self::finished(inner);
        }

        Self {
            inner,
            span: Some(span),
        }
    }
}

impl<B> InstrumentedBody<B> {
    fn finished(inner: B) -> Self {
        Self { inner, span: None }
    }

    fn finish_with_code(&mut self, code: Code) {
        if let Some(span) = self.span.take() {
            span.finish_with_code(code);
        }
    }
}

impl<B> Body for InstrumentedBody<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_data(cx);

        if let Poll::Ready(Some(Err(_))) = poll {
            this.finish_with_code(Code::Unknown);
        }

        poll
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_trailers(cx);

        if let Poll::Ready(result) = &poll {
            match result {
                Ok(trailers) => {
                    if let Some(span) = this.span.take() {
                        let outcome = trailers.as_ref().and_then(grpc_outcome);
                        match outcome {
                            Some(Err(status)) => span.finish(Some(&status)),
                            _ => span.finish(None),
                        };
                    }
                }
                Err(_) => this.finish_with_code(Code::Unknown),
            }
        }

        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Read the call outcome from `grpc-status` headers or trailers.
///
/// `None` when no status is present, `Ok` for `grpc-status: 0`.
pub fn grpc_outcome(headers: &HeaderMap) -> Option<Result<(), Status>> {
    let status = Status::from_header_map(headers)?;
    if status.code() == Code::Ok {
        Some(Ok(()))
    } else {
        Some(Err(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderValue;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use std::time::Duration;
    use tower::{service_fn, ServiceExt};

    #[derive(Default)]
    struct Captured {
        tags: Mutex<Vec<Vec<String>>>,
    }

    impl TimingSink for Captured {
        fn timing(&self, _name: &str, _duration: Duration, tags: &[String], _sample_rate: f64) {
            self.tags.lock().push(tags.to_vec());
        }
    }

    /// One data frame followed by optional trailers
    struct GrpcBody {
        data: Option<Bytes>,
        trailers: Option<HeaderMap>,
    }

    impl GrpcBody {
        fn with_status(code: Code) -> Self {
            let mut trailers = HeaderMap::new();
            trailers.insert("grpc-status", HeaderValue::from(code as i32));
            Self {
                data: Some(Bytes::from_static(b"\0\0\0\0\0")),
                trailers: Some(trailers),
            }
        }
    }

    impl Body for GrpcBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_data(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Bytes, Infallible>>> {
            Poll::Ready(self.get_mut().data.take().map(Ok))
        }

        fn poll_trailers(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<Option<HeaderMap>, Infallible>> {
            Poll::Ready(Ok(self.get_mut().trailers.take()))
        }
    }

    fn layer(sink: &Arc<Captured>) -> StatsdLayer {
        StatsdLayer::new(Some(sink.clone() as Arc<dyn TimingSink>), None)
    }

    fn request(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[tokio::test]
    async fn test_status_read_from_trailers() {
        let sink = Arc::new(Captured::default());
        let service = layer(&sink).layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(GrpcBody::with_status(Code::NotFound)))
        }));

        let response = service.oneshot(request("/foo.Bar/Baz")).await.unwrap();
        // Nothing is emitted until the body is consumed
        assert!(sink.tags.lock().is_empty());

        let mut body = response.into_body();
        assert!(body.data().await.is_some());
        assert!(body.data().await.is_none());
        assert!(body.trailers().await.unwrap().is_some());

        let tags = sink.tags.lock();
        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags[0],
            vec!["grpc.service:foo.Bar", "grpc.method:Baz", "grpc.code:NotFound"]
        );
    }

    #[tokio::test]
    async fn test_trailers_only_response() {
        let sink = Arc::new(Captured::default());
        let service = layer(&sink).layer(service_fn(|_req: Request<()>| async {
            let mut response = Response::new(GrpcBody {
                data: None,
                trailers: None,
            });
            response
                .headers_mut()
                .insert("grpc-status", HeaderValue::from(Code::Unimplemented as i32));
            Ok::<_, Infallible>(response)
        }));

        let response = service.oneshot(request("/foo.Bar/Missing")).await.unwrap();

        let tags = sink.tags.lock();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0][2], "grpc.code:Unimplemented");
        drop(tags);

        // Consuming or dropping the body does not emit again
        drop(response);
        assert_eq!(sink.tags.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_body_reports_canceled() {
        let sink = Arc::new(Captured::default());
        let service = layer(&sink).layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(GrpcBody::with_status(Code::Ok)))
        }));

        let response = service.oneshot(request("/chat.Room/Listen")).await.unwrap();
        let mut body = response.into_body();
        assert!(body.data().await.is_some());
        drop(body);

        let tags = sink.tags.lock();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0][1], "grpc.method:Listen");
        assert_eq!(tags[0][2], "grpc.code:Canceled");
    }

    #[tokio::test]
    async fn test_inner_error_is_returned_unchanged() {
        let sink = Arc::new(Captured::default());
        let service = layer(&sink).layer(service_fn(|_req: Request<()>| async {
            Err::<Response<GrpcBody>, _>("connection reset")
        }));

        let err = service.oneshot(request("/foo.Bar/Baz")).await.err();

        assert_eq!(err, Some("connection reset"));
        assert_eq!(sink.tags.lock()[0][2], "grpc.code:Unknown");
    }

    #[test]
    fn test_grpc_outcome() {
        assert!(grpc_outcome(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("0"));
        assert!(matches!(grpc_outcome(&headers), Some(Ok(()))));

        headers.insert("grpc-status", HeaderValue::from_static("5"));
        headers.insert("grpc-message", HeaderValue::from_static("missing"));
        let status = grpc_outcome(&headers).unwrap().unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "missing");
    }
}
