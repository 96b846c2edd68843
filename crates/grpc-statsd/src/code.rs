//! Mapping from handler errors to gRPC status codes

use tonic::{Code, Status};

/// Determines the status code reported for a failed call.
///
/// Plug a custom implementation into [`Options`](crate::Options) when handlers
/// fail with their own error type, or when a `Status` should be reported
/// under a different code than the one it carries.
pub trait ErrorToCode<E: ?Sized>: Send + Sync {
    /// Classify a handler error
    fn error_to_code(&self, err: &E) -> Code;
}

/// Reads the code carried by a [`Status`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorToCode;

impl ErrorToCode<Status> for DefaultErrorToCode {
    fn error_to_code(&self, err: &Status) -> Code {
        err.code()
    }
}

impl<E, F> ErrorToCode<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> Code + Send + Sync,
{
    fn error_to_code(&self, err: &E) -> Code {
        self(err)
    }
}

/// Derive the code of a finished call. A call without an error is always `OK`.
pub fn classify<E: ?Sized>(mapping: &dyn ErrorToCode<E>, err: Option<&E>) -> Code {
    match err {
        None => Code::Ok,
        Some(err) => mapping.error_to_code(err),
    }
}

/// Canonical gRPC name of a status code, as used in the `grpc.code` tag
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum StoreError {
        Missing,
        Corrupt,
    }

    #[test]
    fn test_absent_error_is_ok() {
        assert_eq!(classify::<Status>(&DefaultErrorToCode, None), Code::Ok);

        // A custom mapping is never consulted for a successful call
        let always_internal = |_: &Status| Code::Internal;
        assert_eq!(classify::<Status>(&always_internal, None), Code::Ok);
    }

    #[test]
    fn test_default_mapping_reads_status_code() {
        let status = Status::not_found("no such key");
        assert_eq!(classify(&DefaultErrorToCode, Some(&status)), Code::NotFound);

        let status = Status::permission_denied("nope");
        assert_eq!(
            DefaultErrorToCode.error_to_code(&status),
            Code::PermissionDenied
        );
    }

    #[test]
    fn test_closure_mapping_for_custom_error() {
        let mapping = |err: &StoreError| match err {
            StoreError::Missing => Code::NotFound,
            StoreError::Corrupt => Code::DataLoss,
        };

        assert_eq!(classify(&mapping, Some(&StoreError::Missing)), Code::NotFound);
        assert_eq!(classify(&mapping, Some(&StoreError::Corrupt)), Code::DataLoss);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(code_name(Code::Ok), "OK");
        assert_eq!(code_name(Code::Cancelled), "Canceled");
        assert_eq!(code_name(Code::NotFound), "NotFound");
        assert_eq!(code_name(Code::Unauthenticated), "Unauthenticated");
        assert_eq!(code_name(Code::from(5)), "NotFound");
    }
}
