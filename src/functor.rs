//! Bridge between the base function of a sum-of-squares cost and the engine.
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::function::DifferentiableFunction;
use crate::lm::{ResidualFunctor, FIRST_JACOBIAN_ROW};

/// Evaluates the base function with the signatures the engine expects.
///
/// The sizes are taken from the base function once and never change.
pub(crate) struct SolverFunctor {
    cost: Arc<dyn DifferentiableFunction>,
    inputs: usize,
    values: usize,
    /// Live parameter vector of the solver
    parameter: Rc<RefCell<DVector<f64>>>,
}

impl SolverFunctor {
    pub fn new(cost: Arc<dyn DifferentiableFunction>, parameter: Rc<RefCell<DVector<f64>>>) -> Self {
        Self {
            inputs: cost.input_size(),
            values: cost.output_size(),
            cost,
            parameter,
        }
    }

    /// Residuals of the base function at `x`.
    pub fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
        self.cost.evaluate(x)
    }

    /// Gradient of the residual `row`, counted in the engine's numbering.
    ///
    /// Returns `None` for rows outside of the base function.
    pub fn evaluate_jacobian_row(&self, x: &DVector<f64>, row: usize) -> Option<DVector<f64>> {
        let row = row
            .checked_sub(FIRST_JACOBIAN_ROW)
            .filter(|&row| row < self.values)?;
        Some(self.cost.gradient(x, row))
    }

    /// Full Jacobian at `x`. Also stores `x` as the solver's parameter.
    pub fn evaluate_jacobian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        self.parameter.borrow_mut().copy_from(x);
        self.cost.jacobian(x)
    }
}

impl ResidualFunctor for SolverFunctor {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn values(&self) -> usize {
        self.values
    }

    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(self.evaluate(x)).filter(|r| r.nrows() == self.values)
    }

    fn jacobian(&mut self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        self.evaluate_jacobian(x)
            .filter(|j| j.shape() == (self.values, self.inputs))
    }

    fn jacobian_row(&mut self, x: &DVector<f64>, row: usize) -> Option<DVector<f64>> {
        self.evaluate_jacobian_row(x, row)
            .filter(|g| g.nrows() == self.inputs)
    }
}
