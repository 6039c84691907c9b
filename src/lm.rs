//! Step-wise Levenberg-Marquardt engine.
//!
//! The engine is driven in two phases: [`StepEngine::minimize_init`] checks
//! the configuration and evaluates the residuals at the starting point, and
//! every call of [`StepEngine::minimize_one_step`] performs one outer
//! iteration of `LMDER` from `MINPACK`. Each call reports a [`Status`].
use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::qr::{LinearLeastSquaresDiagonalProblem, PivotedQR};
use crate::trust_region::determine_lambda_and_parameter_update;
use crate::utils::{epsmch, forward_difference_jacobian, vector_norm};

#[cfg(test)]
mod test_examples;
#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod test_init_step;
#[cfg(test)]
mod test_update_diag;

/// Index of the first residual row handed to [`ResidualFunctor::jacobian_row`].
///
/// This engine numbers Jacobian rows from zero.
pub const FIRST_JACOBIAN_ROW: usize = 0;

/// State reported by the engine after initialization and after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Initialization succeeded, no step was taken yet.
    NotStarted,
    /// A step was accepted and the termination tests did not fire.
    Running,
    /// The configuration or the problem dimensions are invalid.
    ImproperInputParameters,
    /// Both actual and predicted relative reductions are at most `ftol`.
    RelativeReductionTooSmall,
    /// The relative error between two consecutive iterates is at most `xtol`.
    RelativeErrorTooSmall,
    /// Both of the two conditions above hold.
    RelativeErrorAndReductionTooSmall,
    /// The residuals are orthogonal to the Jacobian columns up to `gtol`.
    CosinusTooSmall,
    /// The number of residual evaluations reached `patience`.
    TooManyFunctionEvaluation,
    /// `ftol` is too small, no further reduction is possible.
    FtolTooSmall,
    /// `xtol` is too small, no further improvement of `x` is possible.
    XtolTooSmall,
    /// `gtol` is too small, the residuals are orthogonal to the Jacobian up to machine precision.
    GtolTooSmall,
    /// The residual or Jacobian computation was not successful.
    UserAsked,
}

impl Status {
    /// Every status the engine can report.
    pub const ALL: [Status; 12] = [
        Status::NotStarted,
        Status::Running,
        Status::ImproperInputParameters,
        Status::RelativeReductionTooSmall,
        Status::RelativeErrorTooSmall,
        Status::RelativeErrorAndReductionTooSmall,
        Status::CosinusTooSmall,
        Status::TooManyFunctionEvaluation,
        Status::FtolTooSmall,
        Status::XtolTooSmall,
        Status::GtolTooSmall,
        Status::UserAsked,
    ];

    /// Whether the engine stopped.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::NotStarted | Status::Running)
    }
}

/// Residual and Jacobian provider for the engine.
///
/// Every method returns `None` when the evaluation was not successful, the
/// engine then stops with [`Status::UserAsked`].
pub trait ResidualFunctor {
    /// Number of parameters `$n$`.
    fn inputs(&self) -> usize;

    /// Number of residuals `$m$`.
    fn values(&self) -> usize;

    /// Compute the residual vector `$\vec{r}(\vec{x})\in\R^m$`.
    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>>;

    /// Compute the Jacobian `$\mathbf{J}(\vec{x})\in\R^{m\times n}$`.
    fn jacobian(&mut self, x: &DVector<f64>) -> Option<DMatrix<f64>>;

    /// Compute one row of the Jacobian.
    ///
    /// `row` is counted from [`FIRST_JACOBIAN_ROW`].
    fn jacobian_row(&mut self, x: &DVector<f64>, row: usize) -> Option<DVector<f64>>;
}

/// The contract the iteration driver relies on.
pub trait StepEngine {
    /// Validate the configuration and evaluate the residuals at `x`.
    ///
    /// Returns [`Status::NotStarted`] on success.
    fn minimize_init(&mut self, x: &mut DVector<f64>) -> Status;

    /// Perform one iteration, updating `x` in place.
    fn minimize_one_step(&mut self, x: &mut DVector<f64>) -> Status;

    /// Euclidean norm of the residuals at the current `x`.
    fn fnorm(&self) -> f64;
}

/// How the engine obtains the Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JacobianMode {
    /// Ask the functor for the full Jacobian.
    #[default]
    Analytic,
    /// Assemble the Jacobian from one functor call per residual row.
    RowWise,
    /// Approximate the Jacobian with forward differences of the residuals.
    ForwardDifference,
}

/// Levenberg-Marquardt optimization algorithm.
///
/// The runtime and termination behavior can be controlled by various
/// hyperparameters. The values are only checked when a minimization starts,
/// invalid values make [`StepEngine::minimize_init`] report
/// [`Status::ImproperInputParameters`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevenbergMarquardt {
    ftol: f64,
    xtol: f64,
    gtol: f64,
    stepbound: f64,
    patience: usize,
    epsfcn: f64,
    scale_diag: bool,
    jacobian_mode: JacobianMode,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        let user_tol = epsmch().sqrt();
        Self {
            ftol: user_tol,
            xtol: user_tol,
            gtol: 0.0,
            stepbound: 100.0,
            patience: 400,
            epsfcn: 0.0,
            scale_diag: true,
            jacobian_mode: JacobianMode::Analytic,
        }
    }

    /// Set the relative error desired in the sum of squares.
    ///
    /// Termination occurs when both the actual and
    /// predicted relative reductions are at most `ftol`.
    pub fn with_ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }

    /// Set relative error between last two approximations.
    ///
    /// Termination occurs when the relative error between
    /// two consecutive iterates is at most `xtol`.
    pub fn with_xtol(self, xtol: f64) -> Self {
        Self { xtol, ..self }
    }

    /// Set orthogonality desired between the residual vector and its derivative.
    ///
    /// Termination occurs when the cosine of the angle
    /// between the residual vector `$\vec{r}$` and any column of the Jacobian `$\mathbf{J}$` is at
    /// most `gtol` in absolute value.
    ///
    /// With other words, the algorithm will terminate if
    /// ```math
    ///   \max_{i=1,\ldots,n}\frac{|(\mathbf{J}^\top \vec{r})_i|}{\|\mathbf{J}\vec{e}_i\|\|\vec{r}\|} \leq \texttt{gtol}.
    /// ```
    pub fn with_gtol(self, gtol: f64) -> Self {
        Self { gtol, ..self }
    }

    /// Shortcut to set `ftol`, `xtol` and `gtol` to the same value.
    pub fn with_tol(self, tol: f64) -> Self {
        Self {
            ftol: tol,
            xtol: tol,
            gtol: tol,
            ..self
        }
    }

    /// Set factor for the initial step bound.
    ///
    /// This bound is set to `$\mathtt{stepbound}\cdot\|\mathbf{D}\vec{x}\|$`
    /// if nonzero, or else to `stepbound` itself. In most cases `stepbound` should lie
    /// in the interval `$[0.1,100]$`.
    pub fn with_stepbound(self, stepbound: f64) -> Self {
        Self { stepbound, ..self }
    }

    /// Set the maximal number of residual evaluations.
    pub fn with_patience(self, patience: usize) -> Self {
        Self { patience, ..self }
    }

    /// Set the precision floor for the forward-difference step.
    ///
    /// Only used with [`JacobianMode::ForwardDifference`]. Values below
    /// machine precision fall back to machine precision.
    pub fn with_epsfcn(self, epsfcn: f64) -> Self {
        Self { epsfcn, ..self }
    }

    /// Enable or disable whether the variables will be rescaled internally.
    pub fn with_scale_diag(self, scale_diag: bool) -> Self {
        Self { scale_diag, ..self }
    }

    pub fn with_jacobian_mode(self, jacobian_mode: JacobianMode) -> Self {
        Self {
            jacobian_mode,
            ..self
        }
    }

    fn is_proper(&self) -> bool {
        self.ftol >= 0.0
            && self.xtol >= 0.0
            && self.gtol >= 0.0
            && self.patience > 0
            && self.stepbound > 0.0
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a running minimization.
pub struct LM<O> {
    config: LevenbergMarquardt,
    pub(crate) target: O,
    /// Residuals at the current `x`
    residuals: DVector<f64>,
    residuals_norm: f64,
    pub(crate) diag: DVector<f64>,
    pub(crate) delta: f64,
    lambda: f64,
    pub(crate) xnorm: f64,
    number_of_evaluations: usize,
    number_of_jacobians: usize,
    /// Counted from one, incremented after every accepted step
    pub(crate) iteration: usize,
}

impl<O: ResidualFunctor> LM<O> {
    pub fn new(config: LevenbergMarquardt, target: O) -> Self {
        Self {
            config,
            target,
            residuals: DVector::zeros(0),
            residuals_norm: f64::NAN,
            diag: DVector::zeros(0),
            delta: 0.0,
            lambda: 0.0,
            xnorm: 0.0,
            number_of_evaluations: 0,
            number_of_jacobians: 0,
            iteration: 0,
        }
    }

    /// Number of residual evaluations, forward differences included.
    pub fn nfev(&self) -> usize {
        self.number_of_evaluations
    }

    /// Number of Jacobian evaluations.
    pub fn njev(&self) -> usize {
        self.number_of_jacobians
    }

    /// Number of accepted steps.
    pub fn iterations(&self) -> usize {
        self.iteration.saturating_sub(1)
    }

    /// Initialize and step until the engine stops.
    pub fn minimize(&mut self, x: &mut DVector<f64>) -> Status {
        let status = self.minimize_init(x);
        if status != Status::NotStarted {
            return status;
        }
        loop {
            let status = self.minimize_one_step(x);
            if status != Status::Running {
                return status;
            }
        }
    }

    fn counted_residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        self.number_of_evaluations += 1;
        let m = self.target.values();
        self.target.residuals(x).filter(|r| r.nrows() == m)
    }

    fn jacobian(&mut self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let (m, n) = (self.target.values(), x.nrows());
        self.number_of_jacobians += 1;
        let jacobian = match self.config.jacobian_mode {
            JacobianMode::Analytic => self.target.jacobian(x)?,
            JacobianMode::RowWise => {
                let mut jacobian = DMatrix::zeros(m, n);
                for i in 0..m {
                    let row = self.target.jacobian_row(x, i + FIRST_JACOBIAN_ROW)?;
                    if row.nrows() != n {
                        return None;
                    }
                    jacobian.set_row(i, &row.transpose());
                }
                jacobian
            }
            JacobianMode::ForwardDifference => {
                let residuals = self.residuals.clone();
                let target = &mut self.target;
                let mut evaluations = 0;
                let jacobian =
                    forward_difference_jacobian(x, &residuals, self.config.epsfcn, |probe| {
                        evaluations += 1;
                        target.residuals(probe)
                    });
                self.number_of_evaluations += evaluations;
                jacobian?
            }
        };
        (jacobian.shape() == (m, n)).then_some(jacobian)
    }

    /// Set up the diagonal scaling, test the gradient and rescale.
    ///
    /// On the first iteration the diagonal is set to the column norms of the
    /// Jacobian and the step bound is initialized. Returns the scaled
    /// gradient norm, or the status to stop with.
    pub(crate) fn update_diag(
        &mut self,
        x: &DVector<f64>,
        lls: &mut LinearLeastSquaresDiagonalProblem,
    ) -> Result<f64, Status> {
        if self.iteration == 1 {
            if self.config.scale_diag {
                for (d, col_norm) in self.diag.iter_mut().zip(lls.column_norms.iter()) {
                    *d = if *col_norm == 0.0 { 1.0 } else { *col_norm };
                }
            }
            self.xnorm = vector_norm(&x.component_mul(&self.diag));
            self.delta = if self.xnorm == 0.0 {
                self.config.stepbound
            } else {
                self.config.stepbound * self.xnorm
            };
        }

        // Compute norm of scaled gradient and detect degeneracy
        let gnorm = if self.residuals_norm == 0.0 {
            0.0
        } else {
            lls.max_a_t_b_scaled(self.residuals_norm)
                .ok_or(Status::UserAsked)?
        };
        if gnorm <= self.config.gtol {
            return Err(Status::CosinusTooSmall);
        }

        if self.config.scale_diag {
            for (d, norm) in self.diag.iter_mut().zip(lls.column_norms.iter()) {
                *d = d.max(*norm);
            }
        }
        Ok(gnorm)
    }
}

impl<O: ResidualFunctor> StepEngine for LM<O> {
    fn minimize_init(&mut self, x: &mut DVector<f64>) -> Status {
        let n = x.nrows();
        let m = self.target.values();
        self.number_of_evaluations = 0;
        self.number_of_jacobians = 0;
        self.lambda = 0.0;
        self.iteration = 1;
        self.diag = DVector::from_element(n, 1.0);

        if n == 0 || m < n || self.target.inputs() != n || !self.config.is_proper() {
            return Status::ImproperInputParameters;
        }

        // Evaluate at start point
        self.residuals = match self.counted_residuals(x) {
            Some(residuals) => residuals,
            None => return Status::UserAsked,
        };
        self.residuals_norm = vector_norm(&self.residuals);
        if !self.residuals_norm.is_finite() {
            return Status::UserAsked;
        }
        Status::NotStarted
    }

    fn minimize_one_step(&mut self, x: &mut DVector<f64>) -> Status {
        const P1: f64 = 0.1;
        const P0001: f64 = 1.0e-4;

        let jacobian = match self.jacobian(x) {
            Some(jacobian) => jacobian,
            None => return Status::UserAsked,
        };
        let mut lls = match PivotedQR::new(jacobian) {
            Ok(qr) => qr.into_least_squares_diagonal_problem(self.residuals.clone()),
            Err(_) => return Status::ImproperInputParameters,
        };

        let gnorm = match self.update_diag(x, &mut lls) {
            Ok(gnorm) => gnorm,
            Err(status) => return status,
        };

        loop {
            let param = determine_lambda_and_parameter_update(
                &mut lls,
                &self.diag,
                self.delta,
                self.lambda,
            );
            self.lambda = param.lambda;
            let pnorm = param.dp_norm;

            // at first call, adjust the initial step bound
            if self.iteration == 1 {
                self.delta = self.delta.min(pnorm);
            }

            // Compute new parameters: x - p
            let candidate = &*x - &param.step;
            let new_residuals = match self.counted_residuals(&candidate) {
                Some(residuals) => residuals,
                None => return Status::UserAsked,
            };
            let new_residuals_norm = vector_norm(&new_residuals);

            // Compute predicted and actual reduction
            let actual_reduction = if new_residuals_norm * P1 < self.residuals_norm {
                1.0 - (new_residuals_norm / self.residuals_norm).powi(2)
            } else {
                -1.0
            };
            let temp1 = (lls.a_x_norm(&param.step) / self.residuals_norm).powi(2);
            let temp2 = self.lambda * (pnorm / self.residuals_norm).powi(2);
            let predicted_reduction = temp1 + temp2 * 2.0;
            let dir_der = -(temp1 + temp2);

            let ratio = if predicted_reduction == 0.0 {
                0.0
            } else {
                actual_reduction / predicted_reduction
            };

            // update the step bound
            if ratio <= 0.25 {
                let mut temp = if actual_reduction >= 0.0 {
                    0.5
                } else {
                    0.5 * dir_der / (dir_der + 0.5 * actual_reduction)
                };
                if new_residuals_norm * P1 >= self.residuals_norm || temp < P1 {
                    temp = P1;
                }
                self.delta = temp * self.delta.min(pnorm / P1);
                self.lambda /= temp;
            } else if self.lambda == 0.0 || ratio >= 0.75 {
                self.delta = pnorm / 0.5;
                self.lambda *= 0.5;
            }
            trace!(
                lambda = self.lambda,
                delta = self.delta,
                ratio,
                nfev = self.number_of_evaluations,
                "trust region update"
            );

            // on success, update x, residuals and their norms
            let inner_success = ratio >= P0001;
            if inner_success {
                x.copy_from(&candidate);
                self.xnorm = vector_norm(&x.component_mul(&self.diag));
                self.residuals = new_residuals;
                self.residuals_norm = new_residuals_norm;
                self.iteration += 1;
            }

            // convergence tests
            let ftol_reached = actual_reduction.abs() <= self.config.ftol
                && predicted_reduction <= self.config.ftol
                && 0.5 * ratio <= 1.0;
            let xtol_reached = self.delta <= self.config.xtol * self.xnorm;
            if ftol_reached && xtol_reached {
                return Status::RelativeErrorAndReductionTooSmall;
            }
            if ftol_reached {
                return Status::RelativeReductionTooSmall;
            }
            if xtol_reached {
                return Status::RelativeErrorTooSmall;
            }

            // termination tests
            if self.number_of_evaluations >= self.config.patience {
                return Status::TooManyFunctionEvaluation;
            }
            if actual_reduction.abs() <= epsmch()
                && predicted_reduction <= epsmch()
                && 0.5 * ratio <= 1.0
            {
                return Status::FtolTooSmall;
            }
            if self.delta <= epsmch() * self.xnorm {
                return Status::XtolTooSmall;
            }
            if gnorm <= epsmch() {
                return Status::GtolTooSmall;
            }

            if inner_success {
                return Status::Running;
            }
        }
    }

    fn fnorm(&self) -> f64 {
        self.residuals_norm
    }
}
