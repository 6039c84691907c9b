//! Tests with example functions from the `MINPACK` test suite.
use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use super::{JacobianMode, LevenbergMarquardt, ResidualFunctor, Status, StepEngine, LM};

/// TOL value used by SciPy
const TOL: f64 = 1.49012e-08;

/// Functor built from two closures.
struct Problem<R, J> {
    n: usize,
    m: usize,
    residuals: R,
    jacobian: J,
}

impl<R, J> ResidualFunctor for Problem<R, J>
where
    R: Fn(&DVector<f64>) -> DVector<f64>,
    J: Fn(&DVector<f64>) -> DMatrix<f64>,
{
    fn inputs(&self) -> usize {
        self.n
    }

    fn values(&self) -> usize {
        self.m
    }

    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some((self.residuals)(x))
    }

    fn jacobian(&mut self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        Some((self.jacobian)(x))
    }

    fn jacobian_row(&mut self, x: &DVector<f64>, row: usize) -> Option<DVector<f64>> {
        Some((self.jacobian)(x).row(row).transpose())
    }
}

fn assert_soft_stop(status: Status) {
    assert!(
        matches!(
            status,
            Status::RelativeReductionTooSmall
                | Status::RelativeErrorTooSmall
                | Status::RelativeErrorAndReductionTooSmall
                | Status::CosinusTooSmall
                | Status::FtolTooSmall
                | Status::XtolTooSmall
                | Status::GtolTooSmall
        ),
        "unexpected status {:?}",
        status
    );
}

fn rosenbrock() -> Problem<impl Fn(&DVector<f64>) -> DVector<f64>, impl Fn(&DVector<f64>) -> DMatrix<f64>> {
    Problem {
        n: 2,
        m: 2,
        residuals: |p: &DVector<f64>| {
            DVector::from_column_slice(&[10. * (p[1] - p[0] * p[0]), 1. - p[0]])
        },
        jacobian: |p: &DVector<f64>| DMatrix::from_row_slice(2, 2, &[-20. * p[0], 10., -1., 0.]),
    }
}

#[test]
fn linear_full_rank() {
    for m in [10, 50] {
        let problem = Problem {
            n: 5,
            m,
            residuals: move |p: &DVector<f64>| {
                let mut residuals = DVector::from_element(m, -2. * p.sum() / m as f64 - 1.);
                for j in 0..5 {
                    residuals[j] += p[j];
                }
                residuals
            },
            jacobian: move |_: &DVector<f64>| {
                let mut jacobian = DMatrix::from_element(m, 5, -2. / m as f64);
                for i in 0..5 {
                    jacobian[(i, i)] += 1.;
                }
                jacobian
            },
        };
        let mut lm = LM::new(LevenbergMarquardt::new().with_tol(TOL), problem);
        let mut x = DVector::from_element(5, 1.);
        let status = lm.minimize(&mut x);
        assert_soft_stop(status);
        assert_relative_eq!(x, DVector::from_element(5, -1.), epsilon = 1e-10);
        // sum of squares is m - n
        assert_relative_eq!(lm.fnorm().powi(2), (m - 5) as f64, epsilon = 1e-10);
    }
}

#[test]
fn rosenbrock_from_several_starts() {
    for offset in [0., 10., 100.] {
        let mut lm = LM::new(LevenbergMarquardt::new().with_tol(TOL), rosenbrock());
        let mut x = DVector::from_column_slice(&[-1.2 + offset, 1. + offset]);
        let status = lm.minimize(&mut x);
        assert_soft_stop(status);
        assert_relative_eq!(x, DVector::from_element(2, 1.), epsilon = 1e-8);
        assert!(lm.fnorm() < 1e-8);
        assert!(lm.iterations() > 0);
    }
}

#[test]
fn row_wise_jacobian_matches_analytic() {
    let start = DVector::from_column_slice(&[-1.2, 1.]);

    let mut analytic = LM::new(LevenbergMarquardt::new(), rosenbrock());
    let mut x_analytic = start.clone();
    let status_analytic = analytic.minimize(&mut x_analytic);

    let config = LevenbergMarquardt::new().with_jacobian_mode(JacobianMode::RowWise);
    let mut row_wise = LM::new(config, rosenbrock());
    let mut x_row_wise = start;
    let status_row_wise = row_wise.minimize(&mut x_row_wise);

    assert_eq!(status_analytic, status_row_wise);
    assert_eq!(x_analytic, x_row_wise);
    assert_eq!(analytic.nfev(), row_wise.nfev());
    assert_eq!(analytic.njev(), row_wise.njev());
}

#[test]
fn forward_difference_jacobian() {
    let config = LevenbergMarquardt::new().with_jacobian_mode(JacobianMode::ForwardDifference);
    let mut lm = LM::new(config, rosenbrock());
    let mut x = DVector::from_column_slice(&[-1.2, 1.]);
    let status = lm.minimize(&mut x);
    assert_soft_stop(status);
    assert_relative_eq!(x, DVector::from_element(2, 1.), epsilon = 1e-6);
    // every Jacobian costs one evaluation per parameter
    assert!(lm.nfev() >= 1 + 2 * lm.njev());
}

#[test]
fn patience_limits_evaluations() {
    let mut lm = LM::new(LevenbergMarquardt::new().with_patience(5), rosenbrock());
    let mut x = DVector::from_column_slice(&[-1.2, 1.]);
    assert_eq!(lm.minimize(&mut x), Status::TooManyFunctionEvaluation);
    assert_eq!(lm.nfev(), 5);
}

#[test]
fn helical_valley() {
    const TPI: f64 = ::core::f64::consts::PI * 2.;
    let problem = Problem {
        n: 3,
        m: 3,
        residuals: |p: &DVector<f64>| {
            let tmp1 = if p[0] == 0. {
                0.25f64.copysign(p[1])
            } else if p[0] > 0. {
                (p[1] / p[0]).atan() / TPI
            } else {
                (p[1] / p[0]).atan() / TPI + 0.5
            };
            let tmp2 = (p[0] * p[0] + p[1] * p[1]).sqrt();
            DVector::from_column_slice(&[10. * (p[2] - 10. * tmp1), 10. * (tmp2 - 1.), p[2]])
        },
        jacobian: |p: &DVector<f64>| {
            let temp = p[0] * p[0] + p[1] * p[1];
            let tmp1 = TPI * temp;
            let tmp2 = temp.sqrt();
            #[rustfmt::skip]
            let jacobian = DMatrix::from_row_slice(3, 3, &[
                100. * p[1] / tmp1, -100. * p[0] / tmp1, 10.,
                10. * p[0] / tmp2,  10. * p[1] / tmp2,   0.,
                0.,                 0.,                  1.,
            ]);
            jacobian
        },
    };
    let mut lm = LM::new(LevenbergMarquardt::new().with_tol(TOL), problem);
    let mut x = DVector::from_column_slice(&[-1., 0., 0.]);
    let status = lm.minimize(&mut x);
    assert_soft_stop(status);
    assert_relative_eq!(x, DVector::from_column_slice(&[1., 0., 0.]), epsilon = 1e-6);
}

#[test]
fn bard() {
    const Y: [f64; 15] = [
        0.14, 0.18, 0.22, 0.25, 0.29, 0.32, 0.35, 0.39, 0.37, 0.58, 0.73, 0.96, 1.34, 2.10, 4.39,
    ];
    let problem = Problem {
        n: 3,
        m: 15,
        residuals: |p: &DVector<f64>| {
            DVector::from_iterator(
                15,
                (0..15).map(|i| {
                    let u = (i + 1) as f64;
                    let v = (15 - i) as f64;
                    let w = u.min(v);
                    Y[i] - (p[0] + u / (p[1] * v + p[2] * w))
                }),
            )
        },
        jacobian: |p: &DVector<f64>| {
            DMatrix::from_fn(15, 3, |i, j| {
                let u = (i + 1) as f64;
                let v = (15 - i) as f64;
                let w = u.min(v);
                let denominator = (p[1] * v + p[2] * w).powi(2);
                match j {
                    0 => -1.,
                    1 => u * v / denominator,
                    _ => u * w / denominator,
                }
            })
        },
    };
    let mut lm = LM::new(LevenbergMarquardt::new().with_tol(TOL), problem);
    let mut x = DVector::from_element(3, 1.);
    let status = lm.minimize(&mut x);
    assert_soft_stop(status);
    assert_relative_eq!(lm.fnorm().powi(2), 8.214877306578963e-3, epsilon = 1e-9);
    assert_relative_eq!(
        x,
        DVector::from_column_slice(&[0.08241056, 1.133036, 2.343695]),
        epsilon = 1e-5
    );
}
