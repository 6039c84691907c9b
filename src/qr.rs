//! Pivoted QR factorization and a specialized LLS solver.
//!
//! The QR factorization is used to implement an efficient solver for the
//! linear least squares problem which is repeatedly required to be
//! solved in the LM algorithm.
use nalgebra::{DMatrix, DVector};

use crate::utils::{enorm, epsmch};

/// Errors which can occur using the pivoted QR factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Error {
    ShapeConstraintFailed,
}

/// Pivoted QR decomposition.
///
/// Let `$\mathbf{A}\in\R^{m\times n}$` with `$m\geq n$`.
/// Then this algorithm computes a permutation matrix `$\mathbf{P}$`,
/// a matrix `$\mathbf{Q}\in\R^{m\times n}$` with orthonormal columns
/// and an upper triangular matrix `$\mathbf{R}\in\R^{n\times n}$` such that
/// ```math
/// \mathbf{P}^\top \mathbf{A} \mathbf{P} = \mathbf{Q}\mathbf{R}.
/// ```
pub(crate) struct PivotedQR {
    /// The column norms of the input matrix `$\mathbf{A}$`
    column_norms: DVector<f64>,
    /// Strictly upper part of `$\mathbf{R}$` and the Householder transformations,
    /// combined in one matrix.
    qr: DMatrix<f64>,
    /// Diagonal entries of R
    r_diag: DVector<f64>,
    /// Permutation matrix. Entry `$i$` specifies which column of the identity
    /// matrix to use.
    permutation: Vec<usize>,
    work: DVector<f64>,
}

impl PivotedQR {
    /// Create a pivoted QR decomposition of a matrix `$\mathbf{A}\in\R^{m\times n}$`
    /// with `$m \geq n$`.
    ///
    /// # Errors
    ///
    /// Only returns `Err` when `$m < n$`.
    pub fn new(mut a: DMatrix<f64>) -> Result<Self, Error> {
        // The implementation is based more or less on LAPACK's "xGEQPF"
        let (m, n) = a.shape();
        if m < n {
            return Err(Error::ShapeConstraintFailed);
        }
        let column_norms =
            DVector::from_iterator(n, (0..n).map(|j| enorm(a.column(j).iter().copied())));
        let mut r_diag = column_norms.clone();
        let mut work = column_norms.clone();
        let mut permutation: Vec<usize> = (0..n).collect();
        for j in 0..n {
            // pivot
            let kmax = (j..n).fold(j, |best, k| if r_diag[k] > r_diag[best] { k } else { best });
            if kmax != j {
                a.swap_columns(j, kmax);
                permutation.swap(j, kmax);
                r_diag[kmax] = r_diag[j];
                work[kmax] = work[j];
            }
            // compute Householder reflection vector w_j to
            // reduce the j-th column
            let mut aj_norm = enorm((j..m).map(|i| a[(i, j)]));
            if aj_norm == 0.0 {
                r_diag[j] = 0.0;
                continue;
            }
            if a[(j, j)] < 0.0 {
                aj_norm = -aj_norm;
            }
            for i in j..m {
                a[(i, j)] /= aj_norm;
            }
            a[(j, j)] += 1.0;
            // apply reflection to remaining columns
            for k in j + 1..n {
                let sum: f64 = (j..m).map(|i| a[(i, j)] * a[(i, k)]).sum();
                let temp = sum / a[(j, j)];
                for i in j..m {
                    a[(i, k)] -= temp * a[(i, j)];
                }
                // update partial column norms
                // see "Lapack Working Note 176"
                if r_diag[k] == 0.0 {
                    continue;
                }
                let temp = a[(j, k)] / r_diag[k];
                r_diag[k] *= (1.0 - temp * temp).max(0.0).sqrt();
                if 0.05 * (r_diag[k] / work[k]).powi(2) <= epsmch() {
                    r_diag[k] = enorm((j + 1..m).map(|i| a[(i, k)]));
                    work[k] = r_diag[k];
                }
            }
            r_diag[j] = -aj_norm;
        }
        Ok(Self {
            column_norms,
            qr: a,
            r_diag,
            permutation,
            work,
        })
    }

    /// Consume the QR-decomposition and transform it into
    /// a parametrized least squares problem.
    ///
    /// See [`LinearLeastSquaresDiagonalProblem`] for details.
    pub fn into_least_squares_diagonal_problem(
        mut self,
        mut b: DVector<f64>,
    ) -> LinearLeastSquaresDiagonalProblem {
        // compute first n-entries of Q^T * b
        let (m, n) = self.qr.shape();
        let mut qt_b = DVector::zeros(n);
        for j in 0..n {
            let axis_head = self.qr[(j, j)];
            if axis_head != 0.0 {
                let sum: f64 = (j..m).map(|i| b[i] * self.qr[(i, j)]).sum();
                let temp = -sum / axis_head;
                for i in j..m {
                    b[i] += temp * self.qr[(i, j)];
                }
            }
            qt_b[j] = b[j];
        }
        self.qr.set_diagonal(&self.r_diag);
        LinearLeastSquaresDiagonalProblem {
            qt_b,
            column_norms: self.column_norms,
            upper_r: self.qr,
            l_diag: self.r_diag,
            permutation: self.permutation,
            work: self.work,
        }
    }
}

/// Parametrized linear least squares problem for the LM algorithm.
///
/// The problem is of the form
/// ```math
///   \min_{\vec{x}\in\R^n}\frac{1}{2}\Bigl\|
///     \begin{bmatrix}
///        \mathbf{A} \\
///        \mathbf{D}
///     \end{bmatrix}\vec{x} -
///     \begin{bmatrix}
///         \vec{b} \\
///         \vec{0}
///     \end{bmatrix}
///   \Bigr\|^2,
/// ```
/// for a matrix `$\mathbf{A}\in\R^{m \times n}$`, diagonal matrix
/// `$\mathbf{D}\in\R^n$` and vector `$\vec{b}\in\R^m$`.
/// Everything except the diagonal matrix `$\mathbf{D}$` is considered
/// fixed.
///
/// The problem can be efficiently solved for a sequence of diagonal
/// matrices `$\mathbf{D}$`.
///
/// You must create an instance of this by first computing a pivoted
/// QR decomposition of `$\mathbf{A}$`, then use
/// [`PivotedQR::into_least_squares_diagonal_problem`].
pub(crate) struct LinearLeastSquaresDiagonalProblem {
    /// The first `$n$` entries of `$\mathbf{Q}^\top \vec{b}$`.
    qt_b: DVector<f64>,
    /// Upper part of `$\mathbf{R}$`, also used to store strictly lower part of `$\mathbf{L}$`.
    upper_r: DMatrix<f64>,
    /// Diagonal entries of `$\mathbf{L}$`.
    l_diag: DVector<f64>,
    /// Permutation matrix. Entry `$i$` specifies which column of the identity
    /// matrix to use.
    permutation: Vec<usize>,
    pub(crate) column_norms: DVector<f64>,
    work: DVector<f64>,
}

/// Triangular factor produced by one of the solves of
/// [`LinearLeastSquaresDiagonalProblem`].
///
/// Either the upper triangular `$\mathbf{R}$` (zero diagonal) or the lower
/// triangular `$\mathbf{L}$` after the diagonal was eliminated.
pub(crate) struct CholeskyFactor<'a> {
    pub permutation: &'a [usize],
    l: &'a DMatrix<f64>,
    work: &'a mut DVector<f64>,
    qt_b: &'a DVector<f64>,
    lower: bool,
    l_diag: &'a DVector<f64>,
}

impl<'a> CholeskyFactor<'a> {
    /// Solve the equation `$\mathbf{L}\vec{x} = \mathbf{P}^\top \vec{b}$`.
    pub fn solve(&mut self, mut rhs: DVector<f64>) -> DVector<f64> {
        let n = self.work.nrows();
        for i in 0..n {
            self.work[i] = rhs[self.permutation[i]];
        }
        if self.lower {
            for j in 0..n {
                self.work[j] /= self.l_diag[j];
                let x = self.work[j];
                for i in j + 1..n {
                    self.work[i] -= x * self.l[(i, j)];
                }
            }
        } else {
            for j in 0..n {
                let sum: f64 = (0..j).map(|i| self.work[i] * self.l[(i, j)]).sum();
                self.work[j] = (self.work[j] - sum) / self.l[(j, j)];
            }
        }
        core::mem::swap(self.work, &mut rhs);
        rhs
    }

    /// Computes `$\mathbf{L}\mathbf{Q}^\top\vec{b}$`.
    pub fn mul_qt_b(&mut self, mut out: DVector<f64>) -> DVector<f64> {
        out.fill(0.0);
        let n = out.nrows();
        if self.lower {
            for i in 0..n {
                for k in i + 1..n {
                    out[k] += self.qt_b[i] * self.l[(k, i)];
                }
                out[i] += self.qt_b[i] * self.l_diag[i];
            }
        } else {
            for i in 0..n {
                out[i] = (0..=i).map(|k| self.qt_b[k] * self.l[(k, i)]).sum();
            }
        }
        out
    }
}

impl LinearLeastSquaresDiagonalProblem {
    /// Compute scaled maximum of dot products between `$\vec{b}$` and the columns of `$\mathbf{A}$`.
    ///
    /// It computes
    /// ```math
    ///   \max_{i=1,\ldots,n}\frac{|(\mathbf{A}^\top \vec{b})_i|}{\|\mathbf{A}\vec{e}_i\|\|\vec{b}\|}.
    /// ```
    ///
    /// A fraction with column norm zero is counted as zero. If any
    /// of the computations are nan, `None` is returned.
    pub fn max_a_t_b_scaled(&mut self, b_norm: f64) -> Option<f64> {
        // compute max column of Ab scaled by column norm of A
        let n = self.qt_b.nrows();
        for i in 0..n {
            self.work[i] = self.qt_b[i] / b_norm;
        }
        let mut max = 0.0f64;
        for j in 0..n {
            let scale = self.column_norms[self.permutation[j]];
            if scale == 0.0 {
                continue;
            }
            let sum: f64 = (0..=j).map(|i| self.upper_r[(i, j)] * self.work[i]).sum();
            let temp = (sum / scale).abs();
            if temp.is_nan() {
                return None;
            }
            max = max.max(temp);
        }
        Some(max)
    }

    /// Compute `$\|\mathbf{A}\vec{x}\| = \sqrt{\vec{x}^\top\mathbf{A}^\top\mathbf{A}\vec{x}}$`.
    pub fn a_x_norm(&mut self, x: &DVector<f64>) -> f64 {
        self.work.fill(0.0);
        let n = self.work.nrows();
        for (j, idx) in self.permutation.iter().enumerate().take(n) {
            let temp = x[*idx];
            for i in 0..=j {
                self.work[i] += self.upper_r[(i, j)] * temp;
            }
        }
        enorm(self.work.iter().copied())
    }

    /// Solve the linear least squares problem
    /// for a diagonal matrix `$\mathbf{D}$` (`diag`).
    ///
    /// This is equivalent to solving
    /// ```math
    /// (\mathbf{A}^\top\mathbf{A} + \mathbf{D}\mathbf{D})\vec{x} = \mathbf{A}^\top \vec{b}.
    /// ```
    ///
    /// # Return value
    ///
    /// Returns the solution `$\vec{x}$` and a reference to a lower triangular
    /// matrix `$\mathbf{L}\in\R^{n\times n}$` with
    /// ```math
    ///   \mathbf{P}^\top(\mathbf{A}^\top\mathbf{A} + \mathbf{D}\mathbf{D})\mathbf{P} = \mathbf{L}\mathbf{L}^\top.
    /// ```
    pub fn solve_with_diagonal(
        &mut self,
        diag: &DVector<f64>,
        mut out: DVector<f64>,
    ) -> (DVector<f64>, CholeskyFactor<'_>) {
        out.copy_from(&self.qt_b);
        let mut rhs = self.eliminate_diag(diag, out /* rhs */);
        core::mem::swap(&mut self.work, &mut rhs);
        self.solve_after_elimination(rhs)
    }

    /// Solve the least squares problem with a zero diagonal.
    pub fn solve_with_zero_diagonal(&mut self) -> (DVector<f64>, CholeskyFactor<'_>) {
        let n = self.qt_b.nrows();
        self.work.copy_from(&self.qt_b);
        let rank = self.r_rank();
        for i in rank..n {
            self.work[i] = 0.0;
        }
        // back substitution with the leading rank x rank block of R
        for j in (0..rank).rev() {
            self.work[j] /= self.upper_r[(j, j)];
            let temp = self.work[j];
            for i in 0..j {
                self.work[i] -= self.upper_r[(i, j)] * temp;
            }
        }
        let mut x = DVector::zeros(n);
        for j in 0..n {
            x[self.permutation[j]] = self.work[j];
        }
        let chol = CholeskyFactor {
            permutation: &self.permutation,
            l: &self.upper_r,
            work: &mut self.work,
            qt_b: &self.qt_b,
            lower: false,
            l_diag: &self.l_diag,
        };
        (x, chol)
    }

    pub fn has_full_rank(&self) -> bool {
        let n = self.qt_b.nrows();
        !(0..n).any(|j| self.upper_r[(j, j)] == 0.0)
    }

    fn r_rank(&self) -> usize {
        let n = self.qt_b.nrows();
        (0..n)
            .position(|i| self.upper_r[(i, i)] == 0.0)
            .unwrap_or(n)
    }

    fn rank(&self) -> usize {
        self.l_diag
            .iter()
            .position(|d| *d == 0.0)
            .unwrap_or_else(|| self.l_diag.nrows())
    }

    fn solve_after_elimination(&mut self, mut x: DVector<f64>) -> (DVector<f64>, CholeskyFactor<'_>) {
        let rank = self.rank();
        let n = self.qt_b.nrows();
        for i in rank..n {
            self.work[i] = 0.0;
        }

        // solve L^T * x = rhs
        for j in (0..rank).rev() {
            let dot: f64 = (j + 1..rank)
                .map(|i| self.upper_r[(i, j)] * self.work[i])
                .sum();
            self.work[j] = (self.work[j] - dot) / self.l_diag[j];
        }

        for j in 0..n {
            x[self.permutation[j]] = self.work[j];
        }
        let cholesky_factor = CholeskyFactor {
            l: &self.upper_r,
            work: &mut self.work,
            permutation: &self.permutation,
            qt_b: &self.qt_b,
            lower: true,
            l_diag: &self.l_diag,
        };
        (x, cholesky_factor)
    }

    fn eliminate_diag(&mut self, diag: &DVector<f64>, mut rhs: DVector<f64>) -> DVector<f64> {
        // only lower triangular part is used which was filled with R^T by
        // copying the upper triangle down. This part is then iteratively
        // overwritten with L.
        let n = self.qt_b.nrows();
        for j in 0..n {
            for i in j + 1..n {
                self.upper_r[(i, j)] = self.upper_r[(j, i)];
            }
            // save diagonal of R
            self.work[j] = self.upper_r[(j, j)];
        }
        // eliminate the diagonal entries from D using Givens rotations
        let p5 = 0.5;
        let p25 = 0.25;
        for j in 0..n {
            let diag_entry = diag[self.permutation[j]];
            if diag_entry != 0.0 {
                self.l_diag[j] = diag_entry;
                for k in j + 1..n {
                    self.l_diag[k] = 0.0;
                }

                let mut qtbpj = 0.0;
                for k in j..n {
                    if self.l_diag[k] == 0.0 {
                        continue;
                    }
                    let r_kk = self.upper_r[(k, k)];
                    // determine the Givens rotation
                    let (sin, cos) = if r_kk.abs() < self.l_diag[k].abs() {
                        let cot = r_kk / self.l_diag[k];
                        let sin = p5 / (p25 + p25 * (cot * cot)).sqrt();
                        (sin, sin * cot)
                    } else {
                        let tan = self.l_diag[k] / r_kk;
                        let cos = p5 / (p25 + p25 * (tan * tan)).sqrt();
                        (cos * tan, cos)
                    };
                    // compute the modified diagonal element of R and (Q^T*b,0)
                    self.upper_r[(k, k)] = cos * r_kk + sin * self.l_diag[k];
                    let temp = cos * rhs[k] + sin * qtbpj;
                    qtbpj = -sin * rhs[k] + cos * qtbpj;
                    rhs[k] = temp;

                    // accumulate the transformation in the row of L
                    for i in k + 1..n {
                        let r_ik = self.upper_r[(i, k)];
                        let temp = cos * r_ik + sin * self.l_diag[i];
                        self.l_diag[i] = -sin * r_ik + cos * self.l_diag[i];
                        self.upper_r[(i, k)] = temp;
                    }
                }
            }
            self.l_diag[j] = self.upper_r[(j, j)];
            self.upper_r[(j, j)] = self.work[j];
        }
        rhs
    }
}
