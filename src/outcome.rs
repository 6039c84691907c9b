//! Translation of the engine's terminal status into the result of a solve.
use nalgebra::DVector;

use crate::error::SolveError;
use crate::lm::Status;

/// Final point of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: DVector<f64>,
    /// Cost at `x`
    pub value: f64,
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Clean convergence. No engine status translates to this.
    Converged(Solution),
    /// The engine stopped on a tolerance or a limit, the solution is usable.
    ConvergedWithWarning {
        solution: Solution,
        warning: &'static str,
    },
    Failure(SolveError),
}

impl Outcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Outcome::Converged(solution) | Outcome::ConvergedWithWarning { solution, .. } => {
                Some(solution)
            }
            Outcome::Failure(_) => None,
        }
    }

    pub fn warning(&self) -> Option<&'static str> {
        match self {
            Outcome::ConvergedWithWarning { warning, .. } => Some(*warning),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }
}

/// Diagnostic attached to a status that stops with a usable solution.
pub fn warning_message(status: Status) -> Option<&'static str> {
    let message = match status {
        Status::RelativeReductionTooSmall => "Relative reduction too small.",
        Status::RelativeErrorTooSmall => "Relative error too small.",
        Status::RelativeErrorAndReductionTooSmall => "Relative error and reduction too small.",
        Status::CosinusTooSmall => {
            "The cosine of the angle between fvec and any column of \
             the jacobian is at most gtol in absolute value."
        }
        Status::TooManyFunctionEvaluation => "Too many function evaluations done.",
        Status::FtolTooSmall => {
            "ftol is too small. No further reduction in the sum of \
             squares is possible"
        }
        Status::XtolTooSmall => {
            "xtol is too small. No further improvement in the \
             approximate solution x is possible."
        }
        Status::GtolTooSmall => {
            "gtol is too small. fvec is orthogonal to the columns of \
             the jacobian to machine precision."
        }
        Status::UserAsked => "Error in user-implemented evaluation or gradient computation.",
        Status::NotStarted | Status::Running | Status::ImproperInputParameters => return None,
    };
    Some(message)
}

/// Map a terminal status to an outcome.
///
/// `solution` is only called for statuses that carry a solution.
pub fn translate<F>(status: Status, solution: F) -> Outcome
where
    F: FnOnce() -> Solution,
{
    if status == Status::ImproperInputParameters {
        return Outcome::Failure(SolveError::ImproperInput);
    }
    match warning_message(status) {
        Some(warning) => Outcome::ConvergedWithWarning {
            solution: solution(),
            warning,
        },
        None => Outcome::Failure(SolveError::Undocumented(status)),
    }
}
