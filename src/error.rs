//! # Error Taxonomy
//!
//! Tool-level failures (`ToolError`) are always recovered by the execution loop and fed
//! back to the model as structured `ToolResult` payloads. Provider-level failures
//! (`ProviderError`) are retried inside the provider boundary and, once exhausted, abort
//! the session.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::fuzzy_edit::{EditFailure, EditFailureKind};

/// Machine-readable error codes shared by tool results and terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    OutOfBounds,
    NotFound,
    NoConfidentMatch,
    AmbiguousMatch,
    IoError,
    InvalidState,
    AuthError,
    RateLimited,
    TransportError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::OutOfBounds => "OUT_OF_BOUNDS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::NoConfidentMatch => "NO_CONFIDENT_MATCH",
            ErrorCode::AmbiguousMatch => "AMBIGUOUS_MATCH",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure inside a tool invocation. Never terminates the execution loop.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Path '{path}' resolves outside of the workspace root.")]
    OutOfBounds { path: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Edit {
        message: String,
        kind: EditFailureKind,
        details: Value,
    },
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    InvalidState(String),
}

impl ToolError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ToolError::InvalidRequest(message.into())
    }

    pub fn out_of_bounds(path: impl Into<String>) -> Self {
        ToolError::OutOfBounds { path: path.into() }
    }

    /// Wraps an `std::io::Error` raised while touching `path`.
    pub fn io(path: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(format!("File not found: '{path}'")),
            std::io::ErrorKind::PermissionDenied => {
                ToolError::Io(format!("Permission denied for '{path}': {error}"))
            }
            _ => ToolError::Io(format!("I/O error on '{path}': {error}")),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ToolError::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            ToolError::NotFound(_) => ErrorCode::NotFound,
            ToolError::Edit { kind, .. } => match kind {
                EditFailureKind::InvalidRequest => ErrorCode::InvalidRequest,
                EditFailureKind::NoConfidentMatch => ErrorCode::NoConfidentMatch,
                EditFailureKind::AmbiguousMatch => ErrorCode::AmbiguousMatch,
            },
            ToolError::Io(_) => ErrorCode::IoError,
            ToolError::InvalidState(_) => ErrorCode::InvalidState,
        }
    }

    /// Extra diagnostics attached to the error payload, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            ToolError::Edit { details, .. } if !details.is_null() => Some(details.clone()),
            ToolError::OutOfBounds { path } => Some(json!({ "path": path })),
            _ => None,
        }
    }
}

impl From<EditFailure> for ToolError {
    fn from(failure: EditFailure) -> Self {
        let details = failure.diagnostics();
        ToolError::Edit {
            message: failure.message,
            kind: failure.kind,
            details,
        }
    }
}

/// A failure at the provider boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Auth(_) => ErrorCode::AuthError,
            ProviderError::RateLimited { .. } => ErrorCode::RateLimited,
            ProviderError::Transport(_) => ErrorCode::TransportError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Auth(_))
    }
}
