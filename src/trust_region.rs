//! Solver for the trust-region sub-problem in the LM algorithm.
use nalgebra::DVector;

use crate::qr::LinearLeastSquaresDiagonalProblem;
use crate::utils::vector_norm;

/// Result of the trust-region sub-problem.
pub(crate) struct LMParameter {
    /// The step `$\vec{p}$`, the update is `$\vec{x} - \vec{p}$`.
    pub step: DVector<f64>,
    /// The Levenberg-Marquardt parameter `$\lambda$`.
    pub lambda: f64,
    /// `$\|\mathbf{D}\vec{p}\|$`
    pub dp_norm: f64,
}

/// Approximately solve the LM trust-region subproblem.
///
/// Given `$\mathbf{J}\in\R^{m\times n}$` and a non-singular diagonal matrix `$\mathbf{D}$`
/// this routine approximately solves the problem
/// ```math
///   \min_{\vec{p}\in\R^n}\|\mathbf{J}\vec{p} - \vec{r}\|^2\text{ subject to }\|\mathbf{D}\vec{p}\|\leq\Delta.
/// ```
///
/// It can be shown that `$\vec{p}$` with `$\|\mathbf{D}\vec{p}\|\leq\Delta$` is
/// a solution if and only if there exists `$\lambda\geq 0$` such that
/// ```math
/// \begin{aligned}
/// (\mathbf{J}^\top\mathbf{J} + \lambda \mathbf{D}\mathbf{D})\vec{p} &= \mathbf{J}^\top\vec{r}, \\
/// \lambda(\Delta - \|\mathbf{D}\vec{p}\|) &= 0.
/// \end{aligned}
/// ```
///
/// # Inputs
///
/// The matrix `$\mathbf{J}$` and vector `$\vec{r}$` correspond to `$\mathbf{A}$` and
/// `$\vec{b}$` of [`LinearLeastSquaresDiagonalProblem`].
///
/// # Reference
///
/// This method resembles `LMPAR` from `MINPACK`. See the following paper
/// on how it works:
///
/// > Moré J.J. (1978) The Levenberg-Marquardt algorithm: Implementation and theory. In: Watson G.A. (eds) Numerical Analysis. Lecture Notes in Mathematics, vol 630. Springer, Berlin, Heidelberg.
///
/// Chapter 4.3 of "Numerical Optimization" by Nocedal and Wright also contains
/// information about this algorithm but it misses a few details.
pub(crate) fn determine_lambda_and_parameter_update(
    lls: &mut LinearLeastSquaresDiagonalProblem,
    diag: &DVector<f64>,
    delta: f64,
    initial_lambda: f64,
) -> LMParameter {
    const P1: f64 = 0.1;
    const P001: f64 = 0.001;
    let dwarf = f64::MIN_POSITIVE;

    let full_rank = lls.has_full_rank();
    let n = diag.nrows();
    let (mut p, mut l) = lls.solve_with_zero_diagonal();
    let mut diag_p = p.component_mul(diag);
    let mut diag_p_norm = vector_norm(&diag_p);
    let mut fp = diag_p_norm - delta;
    if fp <= delta * P1 {
        // we have a feasible p with lambda = 0
        return LMParameter {
            step: p,
            lambda: 0.0,
            dp_norm: diag_p_norm,
        };
    }

    // we now look for lambda > 0 with ||D p|| = delta
    // by using an approximate Newton iteration.

    let mut lambda_lower = if full_rank {
        let rhs = DVector::from_fn(n, |i, _| diag[i] * (diag_p[i] / diag_p_norm));
        let temp = vector_norm(&l.solve(rhs));
        fp / delta / temp / temp
    } else {
        0.0
    };

    let gnorm;
    let mut lambda_upper = {
        // Upper bound is given by ||(J * D^-1)^T r|| / delta, see paper cited above.
        let mut g = l.mul_qt_b(DVector::zeros(n));
        for j in 0..n {
            g[j] /= diag[l.permutation[j]];
        }
        gnorm = vector_norm(&g);
        let upper = gnorm / delta;
        if upper == 0.0 {
            dwarf / delta.min(P1)
        } else {
            upper
        }
    };

    let mut lambda = initial_lambda.max(lambda_lower).min(lambda_upper);
    if lambda == 0.0 {
        lambda = gnorm / diag_p_norm;
    }

    for iteration in 1.. {
        if lambda == 0.0 {
            lambda = dwarf.max(lambda_upper * P001);
        }
        let scaled_diag = diag * lambda.sqrt();
        let (p_new, mut l) = lls.solve_with_diagonal(&scaled_diag, p);
        p = p_new;
        diag_p = p.component_mul(diag);
        diag_p_norm = vector_norm(&diag_p);
        let fp_old = fp;
        fp = diag_p_norm - delta;

        // If the function is small enough, accept the current value of lambda.
        if fp.abs() <= delta * P1
            || (lambda_lower == 0.0 && fp <= fp_old && fp_old < 0.0)
            || iteration == 10
        {
            break;
        }

        // compute the Newton correction
        let rhs = DVector::from_fn(n, |i, _| diag[i] * (diag_p[i] / diag_p_norm));
        let temp = vector_norm(&l.solve(rhs));
        let correction = fp / delta / temp / temp;

        // depending on the sign of the function, update lambda_lower or lambda_upper
        if fp > 0.0 {
            lambda_lower = lambda_lower.max(lambda);
        } else if fp < 0.0 {
            lambda_upper = lambda_upper.min(lambda);
        }
        lambda = lambda_lower.max(lambda + correction);
    }

    LMParameter {
        step: p,
        lambda,
        dp_norm: diag_p_norm,
    }
}
