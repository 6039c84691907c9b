//! Solver for nonlinear least-squares problems based on the
//! [Levenberg-Marquardt](https://en.wikipedia.org/wiki/Levenberg%E2%80%93Marquardt_algorithm)
//! algorithm, using [nalgebra](https://nalgebra.org).
//!
//! The solver accepts an [`OptimizationProblem`] whose cost has the form
//! ```math
//! \min_{\vec{x}\in\R^n}f(\vec{x})\quad\text{where}\quad\begin{cases}\begin{aligned}
//!   \ f\!:\R^n &\to \R \\
//!  \vec{x} &\mapsto \|\vec{r}(\vec{x})\|^2 = \sum_{i=1}^m \bigl(r_i(\vec{x})\bigr)^2,
//! \end{aligned}\end{cases}
//! ```
//! for a differentiable _base function_ `$\vec{r}\!:\R^n\to\R^m$`. Note that
//! there is no factor `$\frac{1}{2}$`.
//!
//! # Inputs
//!
//! The base function implements [`DifferentiableFunction`]. It provides the
//! residual vector and the gradient of every residual, the Jacobian
//!   ```math
//!   \mathbf{J} \coloneqq
//!   \begin{pmatrix}
//!   \frac{\partial r_1}{\partial x_1} & \cdots & \frac{\partial r_1}{\partial x_n} \\
//!   \vdots & \ddots & \vdots \\
//!   \frac{\partial r_m}{\partial x_1} & \cdots & \frac{\partial r_m}{\partial x_n}
//!   \end{pmatrix}
//!   ```
//! is assembled from the gradients unless the function overrides
//! [`DifferentiableFunction::jacobian`].
//!
//! The problem may carry a starting point, otherwise the solver starts at
//! zero on the first solve and at the last result afterwards.
//!
//! # Usage Example
//!
//! We use `$f(x, y) \coloneqq (x^2 + y - 11)^2 + (x + y^2 - 7)^2$` as a
//! [test function](https://en.wikipedia.org/wiki/Himmelblau%27s_function).
//!
//! ```
//! # use std::sync::Arc;
//! # use nalgebra::DVector;
//! use lsq_solver::{CostFunction, DifferentiableFunction, OptimizationProblem, Solver};
//!
//! struct Himmelblau;
//!
//! impl DifferentiableFunction for Himmelblau {
//!     fn input_size(&self) -> usize {
//!         2
//!     }
//!
//!     fn output_size(&self) -> usize {
//!         2
//!     }
//!
//!     fn evaluate(&self, p: &DVector<f64>) -> DVector<f64> {
//!         DVector::from_vec(vec![
//!             p[0] * p[0] + p[1] - 11.0,
//!             p[0] + p[1] * p[1] - 7.0,
//!         ])
//!     }
//!
//!     fn gradient(&self, p: &DVector<f64>, row: usize) -> DVector<f64> {
//!         match row {
//!             0 => DVector::from_vec(vec![2.0 * p[0], 1.0]),
//!             _ => DVector::from_vec(vec![1.0, 2.0 * p[1]]),
//!         }
//!     }
//! }
//!
//! let problem = OptimizationProblem::new(CostFunction::sum_of_squares(Arc::new(Himmelblau)))
//!     .with_starting_point(DVector::from_vec(vec![1.0, 1.0]));
//! let mut solver = Solver::new(&problem).unwrap();
//! solver.set_iteration_callback(|_, state| println!("{}: {}", state.iteration, state.value));
//! let outcome = solver.solve();
//! assert!(!outcome.is_failure());
//! assert!(outcome.solution().unwrap().value < 1e-10);
//! ```
//!
//! # Outcomes
//!
//! The engine never reports a clean convergence. Every stop on a tolerance
//! or on the evaluation limit yields [`Outcome::ConvergedWithWarning`] with
//! a message naming the condition. Invalid parameters yield
//! [`Outcome::Failure`].
//!
//! # Logging
//!
//! The crate emits [`tracing`] events and does not install a subscriber.

mod driver;
mod error;
mod function;
mod functor;
mod lm;
mod outcome;
mod parameters;
pub mod plugin;
mod problem;
mod qr;
mod solver;
mod trust_region;
mod utils;

pub use driver::{Driver, Phase};
pub use error::{ConfigError, ConstructionError, RegistryError, SolveError};
pub use function::{CostFunction, DifferentiableFunction, SumOfSquares};
pub use lm::{
    JacobianMode, LevenbergMarquardt, ResidualFunctor, Status, StepEngine, FIRST_JACOBIAN_ROW, LM,
};
pub use outcome::{translate, warning_message, Outcome, Solution};
pub use parameters::{Parameter, ParameterKind, ParameterValue, Parameters};
pub use problem::{ConstraintList, OptimizationProblem};
pub use solver::{IterationCallback, IterationState, Solver};
