//! Error types for the context module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for context construction
#[derive(Debug, Error)]
pub enum ContextError {
    /// Serialization of a payload failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every record is a failed fetch stub, or no record was given
    #[error("No successfully fetched pages to audit")]
    NoPages,

    /// Even the smallest payload for the mode exceeds the budget
    #[error("Context budget of {budget} bytes is too small, at least {needed} bytes are required")]
    BudgetTooSmall { needed: usize, budget: usize },
}

impl From<ContextError> for CrateError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Serialization(e) => CrateError::Json(e),
            _ => CrateError::Context(err.to_string()),
        }
    }
}
