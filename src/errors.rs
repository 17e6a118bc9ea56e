//! Semantic error kinds shared across the HTTP, routing, cache, WebSocket,
//! and GraphQL subsystems.
//!
//! Kinds are grouped the way the propagation policy treats them: recoverable
//! errors are converted into a response by the nearest middleware or
//! handler, transport errors terminate the connection without a response,
//! and internal errors are converted to a 500 by the outermost recovery
//! middleware.

use crate::http::types::{StatusCode, Version};
use std::{fmt, io};

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error(transparent)]
    ClientProtocol(#[from] ClientProtocolError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("rate limit exceeded")]
    RateLimit,

    /// Internal signal only; never surfaced directly to a client.
    #[error("cache miss")]
    CacheMiss,

    /// Internal signal only; never surfaced directly to a client.
    #[error("single-flight builder failed")]
    SingleFlightFailure,

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error(transparent)]
    Transport(#[from] IoError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Stable error code surfaced in `{error, message}` bodies; preserved
    /// even when the message text is masked.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClientProtocol(e) => e.code(),
            Self::Routing(e) => e.code(),
            Self::Validation(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::RateLimit => "RATE_LIMIT_EXCEEDED",
            Self::CacheMiss => "CACHE_MISS",
            Self::SingleFlightFailure => "SINGLE_FLIGHT_FAILURE",
            Self::Resolver(_) => "RESOLVER_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClientProtocol(e) => e.status(),
            Self::Routing(e) => e.status(),
            Self::Validation(_) => StatusCode::BadRequest,
            Self::Auth(e) => e.status(),
            Self::RateLimit => StatusCode::TooManyRequests,
            Self::CacheMiss | Self::SingleFlightFailure => StatusCode::InternalServerError,
            Self::Resolver(_) => StatusCode::Ok, // GraphQL partial data, not an HTTP failure
            Self::Transport(_) => StatusCode::InternalServerError,
            Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Renders the `{error, message}` JSON body, replacing the message with
    /// `generic_message` when `mask` is set while preserving the code.
    pub fn to_json_body(&self, mask: bool, generic_message: &str) -> Vec<u8> {
        let message: &str = if mask { generic_message } else { &self.to_string() };
        serde_json::json!({ "error": self.code(), "message": message })
            .to_string()
            .into_bytes()
    }

    /// Renders a minimal raw HTTP/1.1 response for protocol-level failures
    /// that must be emitted before a `Response` can be built (the request
    /// never reached the router).
    pub fn as_http(&self, version: Version, json: bool) -> Vec<u8> {
        let status = self.status();
        let body = if json {
            self.to_json_body(false, "request could not be processed")
        } else {
            self.to_string().into_bytes()
        };
        let mut out = Vec::with_capacity(64 + body.len());
        out.extend_from_slice(status.into_first_line(version));
        out.extend_from_slice(b"connection: close\r\n");
        out.extend_from_slice(
            format!(
                "content-type: {}\r\ncontent-length: {}\r\n\r\n",
                if json { "application/json" } else { "text/plain" },
                body.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&body);
        out
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientProtocolError {
    #[error("invalid request method")]
    InvalidMethod,
    #[error("invalid request url")]
    InvalidUrl,
    #[error("invalid query string")]
    Query(#[from] crate::http::query::Error),
    #[error("invalid http version")]
    InvalidVersion,
    #[error("unsupported http version")]
    UnsupportedVersion,
    #[error("invalid header")]
    InvalidHeader,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("header section too large")]
    HeaderTooLarge,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("invalid connection header")]
    InvalidConnection,
    #[error("body exceeds max_body_size")]
    BodyTooLarge,
    #[error("body length mismatch: expected {expected}, available {available}")]
    BodyMismatch { expected: usize, available: usize },
    #[error("unexpected body of {0} bytes")]
    UnexpectedBody(usize),
}

impl ClientProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMethod => "INVALID_METHOD",
            Self::InvalidUrl => "INVALID_URL",
            Self::Query(_) => "INVALID_QUERY",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::InvalidHeader => "INVALID_HEADER",
            Self::TooManyHeaders => "TOO_MANY_HEADERS",
            Self::HeaderTooLarge => "HEADER_TOO_LARGE",
            Self::InvalidContentLength => "INVALID_CONTENT_LENGTH",
            Self::InvalidConnection => "INVALID_CONNECTION",
            Self::BodyTooLarge => "BODY_TOO_LARGE",
            Self::BodyMismatch { .. } => "BODY_MISMATCH",
            Self::UnexpectedBody(_) => "UNEXPECTED_BODY",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge => StatusCode::PayloadTooLarge,
            Self::UnsupportedVersion => StatusCode::HttpVersionNotSupported,
            _ => StatusCode::BadRequest,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route matches the request path")]
    NotFound,
    #[error("route matches but not for this method")]
    MethodNotAllowed,
    #[error("route conflict for pattern {0:?}")]
    RouteConflict(String),
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::RouteConflict(_) => "ROUTE_CONFLICT",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NotFound,
            Self::MethodNotAllowed => StatusCode::MethodNotAllowed,
            Self::RouteConflict(_) => StatusCode::InternalServerError,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("selection set nesting exceeds max_depth={max}")]
    DepthLimitExceeded { max: u32 },
    #[error("operation complexity exceeds max_complexity={max}")]
    ComplexityLimitExceeded { max: u32 },
    #[error("introspection is disabled")]
    IntrospectionDisabled,
    #[error("persisted query not found and persisted_queries_only is set")]
    PersistedQueryNotAllowed,
    #[error("csrf token missing or invalid")]
    CsrfFailure,
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DepthLimitExceeded { .. } => "DEPTH_LIMIT_EXCEEDED",
            Self::ComplexityLimitExceeded { .. } => "COMPLEXITY_LIMIT_EXCEEDED",
            Self::IntrospectionDisabled => "INTROSPECTION_DISABLED",
            Self::PersistedQueryNotAllowed => "PERSISTED_QUERY_NOT_ALLOWED",
            Self::CsrfFailure => "CSRF_FAILURE",
            Self::SchemaViolation(_) => "SCHEMA_VIOLATION",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("request host failed the trusted-host check")]
    TrustedHostRejected,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TrustedHostRejected => "TRUSTED_HOST_REJECTED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::InvalidCredentials => StatusCode::Unauthorized,
            Self::TrustedHostRejected => StatusCode::Forbidden,
        }
    }
}

/// Wraps `io::Error` with an `Eq` impl on its `.kind()`, since `io::Error`
/// itself isn't comparable; lets transport failures still be asserted on in
/// tests.
#[derive(Debug)]
pub struct IoError(pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
impl Eq for IoError {}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for IoError {}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self(e)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(e: io::Error) -> Self {
        Self::Transport(IoError(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_preserved_when_message_masked() {
        let err = ErrorKind::Validation(ValidationError::DepthLimitExceeded { max: 15 });
        let masked = err.to_json_body(true, "internal error");
        let s = String::from_utf8(masked).unwrap();
        assert!(s.contains("DEPTH_LIMIT_EXCEEDED"));
        assert!(s.contains("internal error"));
        assert!(!s.contains("max_depth"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ErrorKind::from(ClientProtocolError::BodyTooLarge).status(),
            StatusCode::PayloadTooLarge
        );
        assert_eq!(
            ErrorKind::from(RoutingError::NotFound).status(),
            StatusCode::NotFound
        );
        assert_eq!(ErrorKind::RateLimit.status(), StatusCode::TooManyRequests);
    }
}
