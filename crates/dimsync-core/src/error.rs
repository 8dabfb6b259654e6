//! Error types module
//!
//! All failures inside dimsync are represented by [`DimsyncError`]. "Could not
//! determine dimensions" is deliberately not an error: the dimension sources
//! return `Ok(None)` for it, and only real failures (tool crashes, unreadable
//! output, store outages) travel through this enum.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature, mirroring how the store crate is built.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Result alias used across the workspace.
pub type DimsyncResult<T> = Result<T, DimsyncError>;

#[derive(Debug, thiserror::Error)]
pub enum DimsyncError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{tool} exited with code {exit_code:?}: {stderr}")]
    ToolInvocation {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for DimsyncError {
    fn from(err: SqlxError) -> Self {
        DimsyncError::Database(err)
    }
}

impl From<serde_json::Error> for DimsyncError {
    fn from(err: serde_json::Error) -> Self {
        DimsyncError::Parse(format!("JSON parsing error: {}", err))
    }
}

impl DimsyncError {
    /// Machine-readable code attached to log lines.
    pub fn error_code(&self) -> &'static str {
        match self {
            DimsyncError::Database(_) => "DATABASE_ERROR",
            DimsyncError::Store(_) => "STORE_ERROR",
            DimsyncError::ToolInvocation { .. } => "TOOL_INVOCATION_ERROR",
            DimsyncError::Timeout { .. } => "TIMEOUT",
            DimsyncError::Parse(_) => "PARSE_ERROR",
            DimsyncError::InvalidPath(_) => "INVALID_PATH",
            DimsyncError::Transport(_) => "TRANSPORT_ERROR",
            DimsyncError::NotFound(_) => "NOT_FOUND",
            DimsyncError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the failure came from the asset store rather than from the asset.
    ///
    /// Store failures during selection abandon the tick; everything else is
    /// pinned on the asset being processed.
    pub fn is_store_error(&self) -> bool {
        matches!(self, DimsyncError::Database(_) | DimsyncError::Store(_))
    }
}
