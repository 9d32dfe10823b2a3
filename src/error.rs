//! Error taxonomy for the server.
//!
//! Every variant here maps to exactly one row of the error handling design:
//! transport/protocol errors become JSON-RPC error objects, everything else
//! becomes a tool-result envelope with `isError=true`. Handlers build these
//! via the `ServerError::*` constructors and the dispatcher turns them into
//! the wire shape; they are never allowed to propagate as Rust panics past
//! the dispatcher boundary.

use std::path::PathBuf;

/// Server-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed JSON on a transport line.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Unknown method or malformed params at the protocol level.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tool arguments failed schema validation.
    #[error("validation failed for field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// A path or command was rejected by the permission manager.
    #[error("permission denied: {path} is not permitted: {reason}")]
    PermissionDenied { path: String, reason: String },

    /// Target file, directory, or process id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-unique edit match, duplicate background id, etc.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A shell command or tool call exceeded its allotted time.
    #[error("timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// An external backend (rg/ag/ack/git) returned an unexpected result.
    #[error("external failure ({backend}): {detail}")]
    ExternalFailure { backend: String, detail: String },

    /// I/O error with path context.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything unexpected. Logged at `error` level and reported generically.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// The JSON-RPC error code for the subset of variants that can occur
    /// at the protocol layer, before a tool handler has even been reached.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::ParseError(_) => -32700,
            Self::Protocol(_) => -32600,
            Self::Validation { .. } => -32602,
            _ => -32603,
        }
    }

    /// Render as the human-readable message carried in a tool-result
    /// envelope's content part.
    #[must_use]
    pub fn tool_message(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(source: std::io::Error) -> Self {
        Self::Internal(source.to_string())
    }
}
