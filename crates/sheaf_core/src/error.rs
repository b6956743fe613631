//! Structured error types shared across the reachability core.

use thiserror::Error;

/// Canonical error type for bundle construction, LP solving and
/// flowpipe computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheafError {
    /// A vector, matrix or template has the wrong length for the
    /// ambient state dimension.
    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// The feasible region of a linear program is empty.
    #[error("linear program is infeasible: the constraint region is empty")]
    InfeasibleRegion,
    /// The objective of a linear program grows without bound over the
    /// feasible region.
    #[error("linear program is unbounded along the objective")]
    Unbounded,
    /// A square linear system has no unique solution, typically because
    /// a template selects linearly dependent directions.
    #[error("singular linear system: {what}")]
    SingularSystem { what: String },
    /// Indices, labels or counts violate the bundle's structural
    /// invariants.
    #[error("structural inconsistency: {reason}")]
    StructuralInconsistency { reason: String },
    /// The bound oracle could not produce finite bounds.
    #[error("bound oracle failure: {detail}")]
    BoundOracleFailure { detail: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SheafError>;

impl SheafError {
    /// Shorthand for a [`SheafError::StructuralInconsistency`].
    pub fn structural(reason: impl Into<String>) -> Self {
        SheafError::StructuralInconsistency {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SheafError::SingularSystem`].
    pub fn singular(what: impl Into<String>) -> Self {
        SheafError::SingularSystem { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_quantity() {
        let err = SheafError::DimensionMismatch {
            what: "direction",
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch in direction: expected 3, found 2"
        );

        let err = SheafError::structural("template references direction 7 of 4");
        assert!(err.to_string().contains("direction 7 of 4"));
    }

    #[test]
    fn variants_compare_by_payload() {
        assert_eq!(SheafError::InfeasibleRegion, SheafError::InfeasibleRegion);
        assert_ne!(
            SheafError::singular("a"),
            SheafError::singular("b"),
        );
    }
}
