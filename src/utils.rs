//! Small numeric helpers shared by the QR factorization and the LM engine.
use nalgebra::{DMatrix, DVector};

/// Machine epsilon for `f64`.
#[inline]
pub(crate) fn epsmch() -> f64 {
    f64::EPSILON
}

/// Euclidean norm which avoids destructive underflow and overflow.
///
/// This is the `ENORM` routine from `MINPACK`: small, intermediate and large
/// components are accumulated separately and combined at the end.
pub(crate) fn enorm<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    const RDWARF: f64 = 3.834e-20;
    const RGIANT: f64 = 1.304e19;

    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return 0.0;
    }
    let agiant = RGIANT / values.len() as f64;

    let mut s1 = 0.0;
    let mut s2 = 0.0;
    let mut s3 = 0.0;
    let mut x1max = 0.0f64;
    let mut x3max = 0.0f64;
    for xi in values {
        let xabs = xi.abs();
        if xabs.is_nan() {
            return f64::NAN;
        }
        if xabs >= agiant {
            // large components
            if xabs > x1max {
                s1 = 1.0 + s1 * (x1max / xabs).powi(2);
                x1max = xabs;
            } else {
                s1 += (xabs / x1max).powi(2);
            }
        } else if xabs <= RDWARF {
            // small components
            if xabs > x3max {
                s3 = 1.0 + s3 * (x3max / xabs).powi(2);
                x3max = xabs;
            } else if xabs != 0.0 {
                s3 += (xabs / x3max).powi(2);
            }
        } else {
            s2 += xabs * xabs;
        }
    }
    if s1 != 0.0 {
        x1max * (s1 + (s2 / x1max) / x1max).sqrt()
    } else if s2 != 0.0 {
        if s2 >= x3max {
            (s2 * (1.0 + (x3max / s2) * (x3max * s3))).sqrt()
        } else {
            (x3max * ((s2 / x3max) + (x3max * s3))).sqrt()
        }
    } else {
        x3max * s3.sqrt()
    }
}

/// Euclidean norm of a vector, see [`enorm`].
#[inline]
pub(crate) fn vector_norm(v: &DVector<f64>) -> f64 {
    enorm(v.iter().copied())
}

/// Approximate the Jacobian of `f` at `x` with forward differences.
///
/// This follows `FDJAC2` from `MINPACK`. The step for column `j` is
/// `$\sqrt{\max(\mathtt{epsfcn}, \epsilon)}\,|x_j|$`, or the square root itself
/// when `$x_j = 0$`. `fvec` must hold `$f(\vec{x})$`. Returns `None` as soon
/// as one evaluation of `f` fails.
pub(crate) fn forward_difference_jacobian<Func>(
    x: &DVector<f64>,
    fvec: &DVector<f64>,
    epsfcn: f64,
    mut f: Func,
) -> Option<DMatrix<f64>>
where
    Func: FnMut(&DVector<f64>) -> Option<DVector<f64>>,
{
    let eps = epsfcn.max(epsmch()).sqrt();
    let m = fvec.nrows();
    let n = x.nrows();
    let mut jacobian = DMatrix::zeros(m, n);
    let mut probe = x.clone();
    for j in 0..n {
        let temp = x[j];
        let h = match eps * temp.abs() {
            h if h == 0.0 => eps,
            h => h,
        };
        probe[j] = temp + h;
        let shifted = f(&probe)?;
        probe[j] = temp;
        if shifted.nrows() != m {
            return None;
        }
        for i in 0..m {
            jacobian[(i, j)] = (shifted[i] - fvec[i]) / h;
        }
    }
    Some(jacobian)
}
