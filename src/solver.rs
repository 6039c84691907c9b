//! The least-squares solver exposed to users of an [`OptimizationProblem`].
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use nalgebra::DVector;
use tracing::{error, info, warn};

use crate::driver::Driver;
use crate::error::ConstructionError;
use crate::function::DifferentiableFunction;
use crate::functor::SolverFunctor;
use crate::lm::{JacobianMode, LM};
use crate::outcome::{translate, Outcome, Solution};
use crate::parameters::Parameters;
use crate::problem::OptimizationProblem;

/// Snapshot handed to the iteration callback after every accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    /// Step index, counted from one.
    pub iteration: usize,
    pub x: DVector<f64>,
    /// Cost at `x`
    pub value: f64,
}

pub type IterationCallback<'a> = Box<dyn FnMut(&OptimizationProblem, &IterationState) + 'a>;

/// Levenberg-Marquardt solver for problems with a sum-of-squares cost.
///
/// The solver borrows the problem and works on the base function of its
/// cost `$\|\vec{f}(\vec{x})\|^2$`. Tuning happens through
/// [`parameters_mut`](Solver::parameters_mut), see [`Parameters`] for the
/// recognized keys.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use nalgebra::DVector;
/// # use lsq_solver::{CostFunction, DifferentiableFunction, OptimizationProblem, Solver};
/// /// Fit one constant to the values 1 and 3.
/// struct Constant;
///
/// impl DifferentiableFunction for Constant {
///     fn input_size(&self) -> usize { 1 }
///     fn output_size(&self) -> usize { 2 }
///     fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
///         DVector::from_vec(vec![x[0] - 1.0, x[0] - 3.0])
///     }
///     fn gradient(&self, _x: &DVector<f64>, _row: usize) -> DVector<f64> {
///         DVector::from_element(1, 1.0)
///     }
/// }
///
/// let problem = OptimizationProblem::new(CostFunction::sum_of_squares(Arc::new(Constant)));
/// let mut solver = Solver::new(&problem).unwrap();
/// let outcome = solver.solve();
/// let solution = outcome.solution().unwrap();
/// assert!((solution.x[0] - 2.0).abs() < 1e-6);
/// assert!((solution.value - 2.0).abs() < 1e-6);
/// ```
pub struct Solver<'a> {
    problem: &'a OptimizationProblem,
    cost: Arc<dyn DifferentiableFunction>,
    n: usize,
    m: usize,
    x: Rc<RefCell<DVector<f64>>>,
    parameters: Parameters,
    jacobian_mode: JacobianMode,
    callback: Option<IterationCallback<'a>>,
    result: Option<Outcome>,
}

impl<'a> Solver<'a> {
    /// Create a solver for `problem`.
    ///
    /// Fails when the cost is not a sum of squares or when the starting
    /// point does not match the input size. Constraints are ignored.
    pub fn new(problem: &'a OptimizationProblem) -> Result<Self, ConstructionError> {
        let cost = problem
            .cost()
            .as_sum_of_squares()
            .ok_or(ConstructionError::NotSumOfSquares)?
            .base()
            .clone();
        let (n, m) = (cost.input_size(), cost.output_size());
        if let Some(start) = problem.starting_point() {
            if start.nrows() != n {
                return Err(ConstructionError::StartingPointSize {
                    expected: n,
                    found: start.nrows(),
                });
            }
        }
        if !problem.constraints().is_empty() {
            warn!(
                count = problem.constraints().len(),
                "the Levenberg-Marquardt solver ignores constraints"
            );
        }
        Ok(Self {
            problem,
            cost,
            n,
            m,
            x: Rc::new(RefCell::new(DVector::zeros(n))),
            parameters: Parameters::with_defaults(),
            jacobian_mode: JacobianMode::default(),
            callback: None,
            result: None,
        })
    }

    /// Minimize the cost and store the outcome.
    ///
    /// Starts from the problem's starting point if it has one, otherwise
    /// from the current parameter.
    pub fn solve(&mut self) -> &Outcome {
        if let Some(start) = self.problem.starting_point() {
            *self.x.borrow_mut() = start.clone();
        }
        let config = self.parameters.engine_config(self.jacobian_mode);
        info!(
            n = self.n,
            m = self.m,
            jacobian_mode = ?self.jacobian_mode,
            "starting Levenberg-Marquardt minimization"
        );

        let functor = SolverFunctor::new(self.cost.clone(), self.x.clone());
        let mut driver = Driver::new(LM::new(config, functor));
        let mut x = self.x.borrow().clone();
        let problem = self.problem;
        let shared = &self.x;
        let callback = &mut self.callback;
        let status = driver.run(&mut x, |iteration, x, value| {
            shared.borrow_mut().copy_from(x);
            if let Some(callback) = callback.as_mut() {
                let state = IterationState {
                    iteration,
                    x: x.clone(),
                    value,
                };
                callback(problem, &state);
            }
        });

        let engine = driver.into_engine();
        let outcome = translate(status, || Solution {
            value: problem.cost().value(&x),
            x: x.clone(),
        });
        *self.x.borrow_mut() = x;

        match &outcome {
            Outcome::Converged(solution) => info!(
                value = solution.value,
                iterations = engine.iterations(),
                nfev = engine.nfev(),
                "minimization converged"
            ),
            Outcome::ConvergedWithWarning { solution, warning } => warn!(
                ?status,
                value = solution.value,
                iterations = engine.iterations(),
                nfev = engine.nfev(),
                njev = engine.njev(),
                "minimization stopped: {}",
                warning
            ),
            Outcome::Failure(err) => error!(?status, "minimization failed: {}", err),
        }
        self.result.insert(outcome)
    }

    /// Number of parameters.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of residuals.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Current parameter vector.
    pub fn parameter(&self) -> Ref<'_, DVector<f64>> {
        self.x.borrow()
    }

    pub fn parameter_mut(&mut self) -> RefMut<'_, DVector<f64>> {
        self.x.borrow_mut()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Register a function called after every accepted step.
    pub fn set_iteration_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&OptimizationProblem, &IterationState) + 'a,
    {
        self.callback = Some(Box::new(callback));
    }

    /// The registered iteration callback.
    pub fn callback(&self) -> Option<&IterationCallback<'a>> {
        self.callback.as_ref()
    }

    /// The registered iteration callback, callable.
    pub fn callback_mut(
        &mut self,
    ) -> Option<&mut (dyn FnMut(&OptimizationProblem, &IterationState) + 'a)> {
        self.callback.as_deref_mut()
    }

    /// Remove and return the iteration callback.
    pub fn take_iteration_callback(&mut self) -> Option<IterationCallback<'a>> {
        self.callback.take()
    }

    /// Outcome of the last solve, `None` before the first one.
    pub fn minimum(&self) -> Option<&Outcome> {
        self.result.as_ref()
    }

    /// The base function of the sum-of-squares cost.
    pub fn cost(&self) -> &Arc<dyn DifferentiableFunction> {
        &self.cost
    }

    pub fn problem(&self) -> &'a OptimizationProblem {
        self.problem
    }

    pub fn jacobian_mode(&self) -> JacobianMode {
        self.jacobian_mode
    }

    /// Select how the engine obtains the Jacobian of the base function.
    pub fn set_jacobian_mode(&mut self, jacobian_mode: JacobianMode) {
        self.jacobian_mode = jacobian_mode;
    }
}
