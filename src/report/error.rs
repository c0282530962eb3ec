//! Error types for report generation

use crate::context::ContextError;
use crate::error::Error as CrateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The completion backend returned an error
    #[error("Provider error: {message}")]
    Provider { message: String, recoverable: bool },

    /// A completion call did not finish within the configured timeout
    #[error("Completion timed out after {0} seconds")]
    Timeout(u64),

    /// The context could not be rendered into a prompt
    #[error("Context error: {0}")]
    Context(#[from] ContextError),
}

impl ReportError {
    /// Whether a retry with a reduced context may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReportError::Provider { recoverable, .. } => *recoverable,
            ReportError::Timeout(_) => true,
            ReportError::Context(_) => false,
        }
    }

    /// The terminal form of this error once the retry is spent
    pub fn into_terminal(self) -> Self {
        match self {
            ReportError::Provider { message, .. } => ReportError::Provider {
                message,
                recoverable: false,
            },
            ReportError::Timeout(secs) => ReportError::Provider {
                message: format!("completion timed out after {secs} seconds"),
                recoverable: false,
            },
            other => other,
        }
    }
}

impl From<rig::completion::CompletionError> for ReportError {
    fn from(err: rig::completion::CompletionError) -> Self {
        ReportError::Provider {
            message: err.to_string(),
            recoverable: true,
        }
    }
}

impl From<ReportError> for CrateError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Context(e) => e.into(),
            other => CrateError::Provider(other.to_string()),
        }
    }
}
