//! Error types for the payroll engine.
//!
//! Every fallible library operation returns [`PayrollError`].  Errors are
//! raised before any state is touched, so a caller that receives one can
//! rely on the record it passed in being unchanged.

use crate::lifecycle::PayrollStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayrollError {
    /// Negative or malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A lifecycle operation was requested from a state that forbids it.
    #[error("invalid payroll transition: {from} -> {to}")]
    InvalidTransition {
        from: PayrollStatus,
        to: PayrollStatus,
    },

    /// The tax rule set is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The record exists but its status forbids the edit.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl PayrollError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T, E = PayrollError> = std::result::Result<T, E>;
