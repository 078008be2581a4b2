//! Error types for Shellkit
//!
//! Errors fall in two groups:
//! - Non-fatal outcomes that become a command's exit status (a hook reporting
//!   "exit status N", a read-only assignment, an unusable redirect target).
//! - Fatal runtime errors that stop the interpreter and surface to the host
//!   (I/O failures, cancellation, invalid trees, resource limits).
//!
//! Control flow (`break`, `continue`, `return`, `exit`) is never an error; it
//! travels as [`Flow`](crate::interp::Flow) values.

use crate::limits::LimitExceeded;
use thiserror::Error;

/// Result type alias using Shellkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Shellkit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A command finished with a non-zero status. Returned by exec hooks.
    #[error("exit status {0}")]
    ExitStatus(u8),

    /// Assignment to a read-only variable.
    #[error("{0}: readonly variable")]
    ReadOnly(String),

    /// Invalid identifier given to a declaration or unset.
    #[error("`{0}': not a valid identifier")]
    InvalidName(String),

    /// `${var:?msg}` or `set -u` hit an unset parameter. Ends the shell.
    #[error("{name}: {message}")]
    UnsetParameter { name: String, message: String },

    /// Bad substitution, bad arithmetic or an invalid pattern.
    #[error("{0}")]
    Expansion(String),

    /// A redirect target or sourced file could not be used.
    #[error("{path}: {reason}")]
    Path { path: String, reason: String },

    /// The parse hook rejected its input.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error from a hook or stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The cancellation token fired.
    #[error("execution cancelled")]
    Cancelled,

    /// The syntax tree violates a structural invariant.
    #[error("invalid syntax tree: {0}")]
    InvalidTree(String),

    /// Resource limit exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(#[from] LimitExceeded),

    /// Internal error for unexpected failures such as a panicked task.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::Path`] from an I/O error, keeping only the message.
    pub fn path(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Path {
            path: path.into(),
            reason: io_reason(err),
        }
    }

    /// Whether this error stops the whole interpreter.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Cancelled
                | Self::InvalidTree(_)
                | Self::ResourceLimit(_)
                | Self::Internal(_)
        )
    }

    /// Whether this error ends the shell with status 1 after being reported.
    pub(crate) fn exits_shell(&self) -> bool {
        matches!(self, Self::UnsetParameter { .. })
    }

    /// Map an I/O error from opening a path into the tolerated "path not
    /// usable" class when it belongs there.
    pub(crate) fn from_open(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::IsADirectory
            | ErrorKind::NotADirectory
            | ErrorKind::AlreadyExists => Self::path(path, &err),
            _ => Self::Io(err),
        }
    }
}

/// Shell-style description of an I/O error, without the `(os error N)` tail.
pub(crate) fn io_reason(err: &std::io::Error) -> String {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => "No such file or directory".to_string(),
        ErrorKind::PermissionDenied => "Permission denied".to_string(),
        ErrorKind::IsADirectory => "Is a directory".to_string(),
        ErrorKind::NotADirectory => "Not a directory".to_string(),
        ErrorKind::AlreadyExists => "File exists".to_string(),
        _ => {
            let msg = err.to_string();
            match msg.find(" (os error") {
                Some(idx) => msg[..idx].to_string(),
                None => msg,
            }
        }
    }
}
