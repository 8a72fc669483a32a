//! Error types for sequence registration.

use thiserror::Error;

/// Errors that can occur while registering and stabilising a sequence.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input for pair ({u}, {v}): {reason}")]
    InvalidInput { u: usize, v: usize, reason: String },

    #[error("Registration of pair ({u}, {v}) failed: {reason}")]
    RegistrationFailure { u: usize, v: usize, reason: String },

    #[error(
        "Underdetermined system: {} of {length} frames have no pairwise constraint: {unconstrained:?}",
        .unconstrained.len()
    )]
    UnderdeterminedSystem {
        unconstrained: Vec<usize>,
        length: usize,
    },

    #[error(
        "Solver did not converge for dimension {dimension} after {iterations} iterations (step {step:e}, tolerance {tolerance:e})"
    )]
    SolverConvergence {
        dimension: usize,
        iterations: usize,
        step: f64,
        tolerance: f64,
    },

    #[error("Unsupported registration mode: '{0}'")]
    UnsupportedMode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot register an empty sequence")]
    EmptySequence,

    #[error("Frame index {index} out of range for sequence of length {length}")]
    FrameIndex { index: usize, length: usize },

    #[error("Sequence length mismatch: model has {expected} frames, input has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an external registration primitive.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct PrimitiveError(pub String);

impl PrimitiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_error_message() {
        let err = Error::InvalidInput {
            u: 3,
            v: 7,
            reason: "shape mismatch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input for pair (3, 7): shape mismatch"
        );
    }

    #[test]
    fn test_underdetermined_error_message() {
        let err = Error::UnderdeterminedSystem {
            unconstrained: vec![2, 4, 5],
            length: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 of 6"), "{msg}");
        assert!(msg.contains("[2, 4, 5]"), "{msg}");
    }

    #[test]
    fn test_solver_convergence_error_message() {
        let err = Error::SolverConvergence {
            dimension: 1,
            iterations: 200,
            step: 1e-3,
            tolerance: 1e-7,
        };
        let msg = err.to_string();
        assert!(msg.contains("dimension 1"));
        assert!(msg.contains("200 iterations"));
    }

    #[test]
    fn test_unsupported_mode_error_message() {
        let err = Error::UnsupportedMode("warp".to_string());
        assert_eq!(err.to_string(), "Unsupported registration mode: 'warp'");
    }

    #[test]
    fn test_config_error_source_chain() {
        use std::error::Error as StdError;

        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = Error::from(json_err);
        assert!(err.source().is_some());
    }
}
