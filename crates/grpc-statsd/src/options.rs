//! Interceptor options and their construction-time defaults

use crate::code::{DefaultErrorToCode, ErrorToCode};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tonic::Status;

/// Metric name used when none is configured
pub const DEFAULT_METRIC_NAME: &str = "grpc_middleware";

/// Options accepted by the interceptor factories.
///
/// Every field is optional: an empty `metric_name` falls back to
/// [`DEFAULT_METRIC_NAME`] and a missing `error_to_code` falls back to
/// [`DefaultErrorToCode`].
#[derive(Deserialize)]
#[serde(default, bound = "")]
pub struct Options<E = Status> {
    /// Name of the emitted timing metric
    pub metric_name: String,

    /// Strategy used to turn a handler error into a status code
    #[serde(skip)]
    pub error_to_code: Option<Arc<dyn ErrorToCode<E>>>,
}

impl<E> Options<E> {
    /// Create empty options
    pub fn new() -> Self {
        Self {
            metric_name: String::new(),
            error_to_code: None,
        }
    }

    /// Set the metric name
    pub fn with_metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = metric_name.into();
        self
    }

    /// Set the error classification strategy
    pub fn with_error_to_code(mut self, error_to_code: impl ErrorToCode<E> + 'static) -> Self {
        self.error_to_code = Some(Arc::new(error_to_code));
        self
    }
}

impl<E> Default for Options<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Options<E> {
    fn clone(&self) -> Self {
        Self {
            metric_name: self.metric_name.clone(),
            error_to_code: self.error_to_code.clone(),
        }
    }
}

impl<E> fmt::Debug for Options<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("metric_name", &self.metric_name)
            .field("error_to_code", &self.error_to_code.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Options after defaulting. Immutable once built.
pub struct ResolvedOptions<E = Status> {
    metric_name: String,
    error_to_code: Arc<dyn ErrorToCode<E>>,
}

impl<E> ResolvedOptions<E> {
    /// Metric name every sample is emitted under
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Error classification strategy
    pub fn error_to_code(&self) -> &dyn ErrorToCode<E> {
        self.error_to_code.as_ref()
    }
}

impl<E> Clone for ResolvedOptions<E> {
    fn clone(&self) -> Self {
        Self {
            metric_name: self.metric_name.clone(),
            error_to_code: Arc::clone(&self.error_to_code),
        }
    }
}

impl<E> fmt::Debug for ResolvedOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("metric_name", &self.metric_name)
            .finish_non_exhaustive()
    }
}

impl<E> Options<E> {
    /// Resolve custom options, falling back to the given default strategy
    pub fn resolve_with(
        options: Option<Self>,
        default_error_to_code: Arc<dyn ErrorToCode<E>>,
    ) -> ResolvedOptions<E> {
        let options = options.unwrap_or_default();

        let metric_name = if options.metric_name.is_empty() {
            DEFAULT_METRIC_NAME.to_string()
        } else {
            options.metric_name
        };

        ResolvedOptions {
            metric_name,
            error_to_code: options.error_to_code.unwrap_or(default_error_to_code),
        }
    }
}

impl Options<Status> {
    /// Resolve options for handlers failing with [`Status`]
    pub fn resolve(options: Option<Self>) -> ResolvedOptions<Status> {
        Self::resolve_with(options, Arc::new(DefaultErrorToCode))
    }
}
