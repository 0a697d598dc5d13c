//! Error types of the dispatch pipeline.
//!
//! - [`HttpException`]: an error that already knows the HTTP status and payload it maps to
//! - [`DispatchError`]: everything a guard, pipe, interceptor or handler may fail with
//! - [`BuildError`]: failures found while composing route handlers at startup

use http::StatusCode;
use serde_json::{Value, json};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// The name an exception filter matches errors by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionKind(Cow<'static, str>);

impl ExceptionKind {
    /// Matches every [`HttpException`], whatever its concrete kind.
    pub const HTTP: ExceptionKind = ExceptionKind::from_static("HttpException");
    pub const BAD_REQUEST: ExceptionKind = ExceptionKind::from_static("BadRequest");
    pub const UNAUTHORIZED: ExceptionKind = ExceptionKind::from_static("Unauthorized");
    pub const FORBIDDEN: ExceptionKind = ExceptionKind::from_static("Forbidden");
    pub const NOT_FOUND: ExceptionKind = ExceptionKind::from_static("NotFound");
    pub const INTERNAL: ExceptionKind = ExceptionKind::from_static("InternalServerError");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn for_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::BAD_REQUEST,
            StatusCode::UNAUTHORIZED => Self::UNAUTHORIZED,
            StatusCode::FORBIDDEN => Self::FORBIDDEN,
            StatusCode::NOT_FOUND => Self::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR => Self::INTERNAL,
            _ => Self::HTTP,
        }
    }
}

impl Display for ExceptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ExceptionKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ExceptionKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// An error carrying the status code and JSON payload of the response it produces.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpException {
    status: StatusCode,
    kind: ExceptionKind,
    message: String,
    response: Value,
}

impl HttpException {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let response = json!({
            "statusCode": status.as_u16(),
            "message": message,
            "error": status.canonical_reason().unwrap_or("Unknown"),
        });
        Self { status, kind: ExceptionKind::for_status(status), message, response }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Replaces the JSON payload written by the default exception handler.
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &ExceptionKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response(&self) -> &Value {
        &self.response
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Http(#[from] HttpException),

    #[error("{kind}: {source}")]
    Domain {
        kind: ExceptionKind,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// Tags an arbitrary error with the kind exception filters will match it by.
    pub fn domain<E: Into<BoxError>>(kind: impl Into<ExceptionKind>, error: E) -> Self {
        Self::Domain { kind: kind.into(), source: error.into() }
    }

    pub fn kind(&self) -> &ExceptionKind {
        match self {
            DispatchError::Http(e) => e.kind(),
            DispatchError::Domain { kind, .. } => kind,
        }
    }

    /// Whether a filter declaring `kind` claims this error.
    pub fn is_kind(&self, kind: &ExceptionKind) -> bool {
        if self.kind() == kind {
            return true;
        }
        matches!(self, DispatchError::Http(_)) && *kind == ExceptionKind::HTTP
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Http(e) => e.status(),
            DispatchError::Domain { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("parameter index {index} of {controller}::{method} is bound more than once")]
    DuplicateParamIndex { controller: &'static str, method: String, index: usize },

    #[error("{controller}::{method} renders template '{template}' but no renderer is configured")]
    MissingRenderer { controller: &'static str, method: String, template: String },

    #[error("invalid response header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("route '{path}' can not be registered: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

impl BuildError {
    pub fn invalid_header<S: ToString>(name: impl Into<String>, reason: S) -> Self {
        Self::InvalidHeader { name: name.into(), reason: reason.to_string() }
    }
}
