//! Error types for routesync
//!
//! Every failure surfaced by the core is an [`Error`]. Callers that need to
//! react to the *class* of failure (show a warning, ask for manual inspection,
//! offer a retry) use [`Error::kind`] instead of matching variants directly.

use thiserror::Error;

/// Result type alias for routesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Local file access errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network-related errors (request never got a provider answer)
    #[error("Network error: {0}")]
    Network(String),

    /// Structured error payload returned by the DNS provider
    #[error("Provider error ({provider}){}: {message}", code_suffix(.code))]
    Provider {
        /// Provider name
        provider: String,
        /// Provider-side error code, when the payload carried one
        code: Option<i64>,
        /// Error message
        message: String,
    },

    /// The external validator rejected the new proxy configuration
    #[error("Configuration rejected by validator: {0}")]
    Validation(String),

    /// The proxy daemon could not be reloaded or restarted
    #[error("Reload failed: {0}")]
    Reload(String),

    /// A domain or snippet that must be unique already exists
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Snippet is still imported by proxy entries
    #[error("Snippet '{name}' is still imported by {usage} proxy {}", entries_word(.usage))]
    ReferentialIntegrity {
        /// Snippet name
        name: String,
        /// Number of importing entries
        usage: usize,
    },

    /// A proxy entry handle from an older parse was used after the file changed
    #[error("Proxy entry handle is stale (parsed at generation {handle}, config is at {current}); refresh and retry")]
    StaleEntry {
        /// Generation the handle was stamped with
        handle: u64,
        /// Current config generation
        current: u64,
    },

    /// A step failed before the commit boundary
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// Name of the failed step
        step: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// A step failed after the commit boundary; the two systems now disagree
    #[error("Step '{step}' failed after the proxy change was committed: {source}")]
    StateInconsistency {
        /// Name of the failed step
        step: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Restoring the configuration backup failed during rollback
    #[error("Rollback of step '{step}' failed, configuration may be half-written: {cause}; restore error: {restore}")]
    CriticalRollback {
        /// Step whose failure triggered the rollback
        step: String,
        /// Original failure
        cause: Box<Error>,
        /// Failure of the restore itself
        restore: Box<Error>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record, entry, snippet or backup not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" [code {c}]")).unwrap_or_default()
}

fn entries_word(usage: &usize) -> &'static str {
    if *usage == 1 { "entry" } else { "entries" }
}

/// Failure classes shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Network or file access failure; re-issuing the intent may succeed
    TransientIo,
    /// External validator rejected the configuration
    Validation,
    /// Duplicate domain or snippet
    Conflict,
    /// Snippet still in use
    ReferentialIntegrity,
    /// Post-commit failure, systems disagree until the next sync
    StateInconsistency,
    /// Rollback itself failed; manual inspection required
    CriticalRollbackFailure,
    /// Rejected before any step ran
    InvalidInput,
    /// Anything else
    Other,
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a provider error without a provider code
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Create a provider error carrying the provider's code
    pub fn provider_code(provider: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a reload error
    pub fn reload(msg: impl Into<String>) -> Self {
        Self::Reload(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wrap an error with the step that produced it
    pub fn at_step(step: impl Into<String>, source: Error) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Network(_) | Self::Provider { .. } | Self::Reload(_) => {
                ErrorKind::TransientIo
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ReferentialIntegrity { .. } => ErrorKind::ReferentialIntegrity,
            Self::StateInconsistency { .. } => ErrorKind::StateInconsistency,
            Self::CriticalRollback { .. } => ErrorKind::CriticalRollbackFailure,
            Self::Step { source, .. } => source.kind(),
            Self::StaleEntry { .. } | Self::InvalidInput(_) | Self::Config(_) => {
                ErrorKind::InvalidInput
            }
            Self::Json(_) | Self::NotFound(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Name of the step this error is attributed to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. }
            | Self::StateInconsistency { step, .. }
            | Self::CriticalRollback { step, .. } => Some(step),
            _ => None,
        }
    }

    /// True when the on-disk configuration may be inconsistent and needs manual inspection
    pub fn is_critical(&self) -> bool {
        self.kind() == ErrorKind::CriticalRollbackFailure
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
