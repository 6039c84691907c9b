use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;

use crate::function::{CostFunction, DifferentiableFunction};

/// Constraint functions attached to a problem.
pub type ConstraintList = Vec<Arc<dyn DifferentiableFunction>>;

/// A minimization problem handed to a solver.
///
/// The solver borrows the problem for its whole lifetime and never modifies it.
#[derive(Clone)]
pub struct OptimizationProblem {
    cost: CostFunction,
    starting_point: Option<DVector<f64>>,
    constraints: ConstraintList,
}

impl OptimizationProblem {
    pub fn new(cost: CostFunction) -> Self {
        Self {
            cost,
            starting_point: None,
            constraints: Vec::new(),
        }
    }

    /// Set the point every solve starts from.
    pub fn with_starting_point(self, starting_point: DVector<f64>) -> Self {
        Self {
            starting_point: Some(starting_point),
            ..self
        }
    }

    pub fn with_constraint(mut self, constraint: Arc<dyn DifferentiableFunction>) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn set_starting_point(&mut self, starting_point: Option<DVector<f64>>) {
        self.starting_point = starting_point;
    }

    pub fn cost(&self) -> &CostFunction {
        &self.cost
    }

    pub fn starting_point(&self) -> Option<&DVector<f64>> {
        self.starting_point.as_ref()
    }

    pub fn constraints(&self) -> &ConstraintList {
        &self.constraints
    }
}

impl fmt::Debug for OptimizationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationProblem")
            .field("cost", &self.cost)
            .field("starting_point", &self.starting_point)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}
