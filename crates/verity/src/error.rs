#![forbid(unsafe_code)]

//! Validator failure taxonomy.
//!
//! A failing validator never propagates to the caller that triggered
//! re-evaluation; the failure is logged and the constraint's outcome becomes
//! [`Outcome::Unknown`](crate::Outcome::Unknown), leaving the subject
//! neither valid nor invalid for that constraint.

use thiserror::Error;

/// Boxed error payload carried by a failed validation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a validation attempt produced no result.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// The validator reported a failure, either synchronously or through
    /// [`Completion::fail`](crate::Completion::fail).
    #[error("validator failed: {0}")]
    Failed(#[source] BoxError),

    /// The [`Completion`](crate::Completion) handle for a deferred
    /// validation was dropped without resolving.
    #[error("validator dropped its completion handle without resolving")]
    Abandoned,

    /// A constraint with no completion executor returned a deferred
    /// validation. Synchronous constraints must complete inline.
    #[error("synchronous constraint returned a deferred validation")]
    DeferredWithoutExecutor,
}

impl ValidatorError {
    /// Wrap an arbitrary error as a validator failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }

    /// Shorthand for a message-only failure.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_shorthand_displays() {
        let err = ValidatorError::message("lookup timed out");
        assert_eq!(err.to_string(), "validator failed: lookup timed out");
    }

    #[test]
    fn abandoned_display() {
        assert_eq!(
            ValidatorError::Abandoned.to_string(),
            "validator dropped its completion handle without resolving"
        );
    }
}
