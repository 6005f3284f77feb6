//! Stable wire error codes
//!
//! Every failed operation surfaces one of these codes plus a human-readable
//! message. Codes are part of the protocol contract; add new ones, never
//! rename existing ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error category surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Schema/type mismatch, unknown operation
    InvalidRequest,
    /// Numeric/enumerated value outside its domain
    OutOfRange,
    /// References a non-existent track/clip/pattern/node
    NotFound,
    /// Attempted state violates invariants
    Conflict,
    /// Media upload rejected
    UnsupportedFormat,
    /// Plugin host could not scan/instantiate/load
    PluginError,
    /// UI-thread dispatch exceeded its bound
    Timeout,
    /// File read/write failed
    IoError,
    /// Audio graph or plugin host not yet initialized
    BackendUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::OutOfRange => "out_of_range",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::UnsupportedFormat => "unsupported_format",
            Self::PluginError => "plugin_error",
            Self::Timeout => "timeout",
            Self::IoError => "io_error",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed operation: stable code plus message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfRange, message)
    }

    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} {} not found", kind, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedFormat, message)
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PluginError, message)
    }

    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("{} timed out after {}ms", operation, timeout_ms),
        )
    }

    pub fn io(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::IoError, message.to_string())
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendUnavailable, message)
    }
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e)
    }
}
