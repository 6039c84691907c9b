//! Error types of the crate.
//!
//! Construction and configuration errors are returned as `Result`s, solver
//! failures are carried inside [`Outcome::Failure`](crate::Outcome::Failure).
use thiserror::Error;

use crate::lm::Status;
use crate::parameters::ParameterKind;

/// The problem handed to the solver cannot be solved by it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("expected a sum-of-squares cost function")]
    NotSumOfSquares,

    #[error("starting point has {found} entries, the cost function expects {expected}")]
    StartingPointSize { expected: usize, found: usize },
}

/// Invalid access to the parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("parameter `{key}` has type {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: ParameterKind,
        found: ParameterKind,
    },
}

/// Hard failure reported by a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("Improper input parameters")]
    ImproperInput,

    /// The engine stopped with a status that has no translation.
    #[error("Return value not documented")]
    Undocumented(Status),
}

/// Lookup failure in a [`SolverRegistry`](crate::plugin::SolverRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no solver registered under `{0}`")]
    UnknownSolver(String),

    #[error(transparent)]
    Construction(#[from] ConstructionError),
}
