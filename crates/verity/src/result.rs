#![forbid(unsafe_code)]

//! The result of one validator invocation.

/// Outcome of validating one value against one constraint, with an optional
/// application-defined diagnostic payload (an error message, a hint, a
/// severity-tagged record).
///
/// Diagnostics are not reserved for failures: a passing validation may carry
/// one as well (e.g. a confirmation message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult<D> {
    valid: bool,
    diagnostic: Option<D>,
}

impl<D> ValidationResult<D> {
    /// A passing result without a diagnostic.
    pub fn valid() -> Self {
        Self {
            valid: true,
            diagnostic: None,
        }
    }

    /// A failing result without a diagnostic.
    pub fn invalid() -> Self {
        Self {
            valid: false,
            diagnostic: None,
        }
    }

    /// A passing result carrying a diagnostic.
    pub fn valid_with(diagnostic: D) -> Self {
        Self {
            valid: true,
            diagnostic: Some(diagnostic),
        }
    }

    /// A failing result carrying a diagnostic.
    pub fn invalid_with(diagnostic: D) -> Self {
        Self {
            valid: false,
            diagnostic: Some(diagnostic),
        }
    }

    /// Build a result from a boolean verdict.
    pub fn from_bool(valid: bool) -> Self {
        if valid { Self::valid() } else { Self::invalid() }
    }

    /// Whether the validated value passed this constraint.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The diagnostic payload, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&D> {
        self.diagnostic.as_ref()
    }

    /// Consume the result, returning its verdict and diagnostic.
    pub fn into_parts(self) -> (bool, Option<D>) {
        (self.valid, self.diagnostic)
    }
}
