//! Common error types for the Berth reconciler.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BerthError`].
pub type BerthResult<T> = Result<T, BerthError>;

/// Failure class of a [`BerthError`].
///
/// Every failure aborts the current reconciliation step and leaves the
/// previously recorded state untouched. None of them are retried by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or contradictory input, detected before any engine call.
    InvalidSpecification,
    /// An option that is only valid on a path that was not selected.
    UnsupportedOption,
    /// The engine rejected or failed an operation.
    EngineOperationFailed,
    /// An operation exceeded its bounded duration.
    Timeout,
    /// Anything outside the reconciliation taxonomy (I/O, state files, bugs).
    Other,
}

/// Common errors across the Berth crates.
#[derive(Error, Diagnostic, Debug)]
pub enum BerthError {
    /// The declared image specification is malformed or contradictory.
    #[error("Invalid specification: {message}")]
    #[diagnostic(code(berth::spec::invalid))]
    InvalidSpecification {
        /// What is wrong with the declaration.
        message: String,
    },

    /// An option was requested on a build path that does not support it.
    #[error("Unsupported option `{option}`: {reason}")]
    #[diagnostic(
        code(berth::spec::unsupported_option),
        help("Options such as secrets and build log files require `build.builder` to be set")
    )]
    UnsupportedOption {
        /// The option name as written in the manifest.
        option: String,
        /// Why it cannot be honoured.
        reason: String,
    },

    /// The container engine rejected or failed an operation.
    #[error("Engine {operation} failed: {message}")]
    #[diagnostic(code(berth::engine::failed))]
    EngineOperationFailed {
        /// Engine operation (pull, build, inspect, remove, cancel).
        operation: String,
        /// Engine-provided detail, verbatim.
        message: String,
    },

    /// An operation exceeded its deadline and was cancelled.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    #[diagnostic(
        code(berth::timeout),
        help("Raise the resource's `timeouts` block if the operation legitimately takes longer")
    )]
    Timeout {
        /// The reconciliation step that timed out.
        operation: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// No recorded state exists for a resource.
    #[error("Resource not found: {id}")]
    #[diagnostic(code(berth::resource::not_found))]
    ResourceNotFound {
        /// The resource address that was not found.
        id: String,
    },

    /// Invalid resource identifier or address.
    #[error("Invalid resource ID: {id}")]
    #[diagnostic(
        code(berth::resource::invalid_id),
        help("Resource IDs must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidResourceId {
        /// The invalid ID.
        id: String,
    },

    /// Invalid duration string.
    #[error("Invalid duration: {value}")]
    #[diagnostic(
        code(berth::duration::invalid),
        help("Use formats like '20m', '1h30m', '45s' or a plain number of seconds")
    )]
    InvalidDuration {
        /// The invalid value.
        value: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(berth::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(berth::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(berth::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(berth::internal),
        help("This is a bug, please report it at https://github.com/fishmindlabs360/berth/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl BerthError {
    /// Shorthand for [`BerthError::InvalidSpecification`].
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            message: message.into(),
        }
    }

    /// Shorthand for [`BerthError::EngineOperationFailed`].
    pub fn engine(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EngineOperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// The failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpecification { .. } => ErrorKind::InvalidSpecification,
            Self::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            Self::EngineOperationFailed { .. } => ErrorKind::EngineOperationFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Other,
        }
    }
}

impl From<serde_json::Error> for BerthError {
    fn from(err: serde_json::Error) -> Self {
        BerthError::Serialization(err.to_string())
    }
}
