//! Differentiable functions and the cost functions built from them.
use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

/// A vector-valued function `$\vec{f}\colon\R^n\to\R^m$` with first derivatives.
pub trait DifferentiableFunction {
    /// Number of inputs `$n$`.
    fn input_size(&self) -> usize;

    /// Number of outputs `$m$`.
    fn output_size(&self) -> usize;

    /// Compute `$\vec{f}(\vec{x})$`, a vector of length [`output_size`](Self::output_size).
    fn evaluate(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Gradient of the output `row` at `x`, a vector of length [`input_size`](Self::input_size).
    fn gradient(&self, x: &DVector<f64>, row: usize) -> DVector<f64>;

    /// Jacobian of `$\vec{f}$` at `x`, or `None` if it cannot be computed.
    ///
    /// The default implementation stacks the gradients of all outputs and
    /// returns `None` as soon as one gradient has the wrong length.
    fn jacobian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let n = self.input_size();
        let mut jacobian = DMatrix::zeros(self.output_size(), n);
        for row in 0..self.output_size() {
            let gradient = self.gradient(x, row);
            if gradient.nrows() != n {
                return None;
            }
            jacobian.set_row(row, &gradient.transpose());
        }
        Some(jacobian)
    }
}

/// The cost `$\|\vec{f}(\vec{x})\|^2$` of a base function `$\vec{f}$`.
///
/// There is no factor `$\frac{1}{2}$`.
#[derive(Clone)]
pub struct SumOfSquares {
    base: Arc<dyn DifferentiableFunction>,
}

impl SumOfSquares {
    pub fn new(base: Arc<dyn DifferentiableFunction>) -> Self {
        Self { base }
    }

    /// The inner vector-valued function.
    pub fn base(&self) -> &Arc<dyn DifferentiableFunction> {
        &self.base
    }

    pub fn value(&self, x: &DVector<f64>) -> f64 {
        self.base.evaluate(x).norm_squared()
    }
}

impl DifferentiableFunction for SumOfSquares {
    fn input_size(&self) -> usize {
        self.base.input_size()
    }

    fn output_size(&self) -> usize {
        1
    }

    fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, self.value(x))
    }

    fn gradient(&self, x: &DVector<f64>, _row: usize) -> DVector<f64> {
        let residuals = self.base.evaluate(x);
        match self.base.jacobian(x) {
            Some(jacobian) if jacobian.nrows() == residuals.nrows() => {
                jacobian.tr_mul(&residuals) * 2.0
            }
            _ => DVector::from_element(self.input_size(), f64::NAN),
        }
    }
}

impl fmt::Debug for SumOfSquares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumOfSquares")
            .field("input_size", &self.base.input_size())
            .field("output_size", &self.base.output_size())
            .finish()
    }
}

/// Scalar cost of an optimization problem.
#[derive(Clone)]
pub enum CostFunction {
    /// Squared norm of a vector-valued function, see [`SumOfSquares`].
    SumOfSquares(SumOfSquares),
    /// Any other scalar function, its single output is the cost.
    Differentiable(Arc<dyn DifferentiableFunction>),
}

impl CostFunction {
    pub fn sum_of_squares(base: Arc<dyn DifferentiableFunction>) -> Self {
        CostFunction::SumOfSquares(SumOfSquares::new(base))
    }

    /// The sum-of-squares view of the cost, if it has that shape.
    pub fn as_sum_of_squares(&self) -> Option<&SumOfSquares> {
        match self {
            CostFunction::SumOfSquares(cost) => Some(cost),
            CostFunction::Differentiable(_) => None,
        }
    }

    pub fn input_size(&self) -> usize {
        match self {
            CostFunction::SumOfSquares(cost) => cost.input_size(),
            CostFunction::Differentiable(f) => f.input_size(),
        }
    }

    /// Evaluate the cost at `x`.
    pub fn value(&self, x: &DVector<f64>) -> f64 {
        match self {
            CostFunction::SumOfSquares(cost) => cost.value(x),
            CostFunction::Differentiable(f) => f.evaluate(x)[0],
        }
    }
}

impl fmt::Debug for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostFunction::SumOfSquares(cost) => cost.fmt(f),
            CostFunction::Differentiable(g) => f
                .debug_struct("Differentiable")
                .field("input_size", &g.input_size())
                .field("output_size", &g.output_size())
                .finish(),
        }
    }
}
