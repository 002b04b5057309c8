//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `mayfly-rs`.
pub type MayflyResult<T> = Result<T, MayflyError>;

/// High-level error categories shared across the workspace.
///
/// Command-level failures (unknown command, wrong value kind, bad argument)
/// never surface here; they are reported in-band as tagged error replies.
/// These variants cover the conditions that end a connection or the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MayflyError {
    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Client payload violates the wire protocol framing rules.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket or poller I/O failed.
    #[error("io error: {0}")]
    Io(String),
}
