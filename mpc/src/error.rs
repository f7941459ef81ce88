use thiserror::Error;

use nlp::SolveFailure;
use prelude::*;
use vehicle_model::ModelError;

/// Rejected controller configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MpcError {
    #[error("horizon must contain at least 2 steps, got {0}")]
    HorizonTooShort(usize),
    #[error("timestep must be finite and positive, got {0}")]
    InvalidTimestep(float),
    #[error("reference speed must be finite, got {0}")]
    InvalidReferenceSpeed(float),
    #[error("invalid {0} bounds")]
    InvalidBounds(&'static str),
    #[error("cost weight {name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: float },
    #[error("solver time limit must be finite and positive, got {0}")]
    InvalidTimeLimit(float),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Why a control cycle fell back instead of using the optimised actuation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ControlFailure {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("solver failed: {0}")]
    Solver(#[from] SolveFailure),
    #[error("solution contains non-finite values")]
    NonFiniteSolution,
    #[error("solution has {actual} variables, expected {expected}")]
    SolutionLength { expected: usize, actual: usize },
}
