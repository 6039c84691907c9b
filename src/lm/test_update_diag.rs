use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use super::test_helpers::{MockCall, MockFunctor};
use super::{LevenbergMarquardt, Status, StepEngine, LM};
use crate::qr::{LinearLeastSquaresDiagonalProblem, PivotedQR};

fn jacobian() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 2, &[1., 2., 4., -2., 0.5, 0.1])
}

fn setup(config: LevenbergMarquardt, x: &[f64]) -> (LM<MockFunctor>, DVector<f64>, DVector<f64>) {
    let residuals = DVector::from_column_slice(&[1., 2., 0.5]);
    let problem = MockFunctor::new(2, 3, vec![Some(residuals.clone())]);
    let mut lm = LM::new(config, problem);
    let mut x = DVector::from_column_slice(x);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    (lm, x, residuals)
}

fn make_lls(jacobian: DMatrix<f64>, residuals: &DVector<f64>) -> LinearLeastSquaresDiagonalProblem {
    PivotedQR::new(jacobian)
        .ok()
        .unwrap()
        .into_least_squares_diagonal_problem(residuals.clone())
}

#[test]
fn gnorm_and_gtol() {
    let config = LevenbergMarquardt::new().with_gtol(0.98);
    let (mut lm, x, residuals) = setup(config, &[0., 0.]);
    let mut lls = make_lls(jacobian(), &residuals);
    assert_eq!(lm.update_diag(&x, &mut lls), Err(Status::CosinusTooSmall));
    assert_eq!(lm.target.calls(), &[MockCall::Residuals]);

    let config = LevenbergMarquardt::new().with_gtol(0.96);
    let (mut lm, x, residuals) = setup(config, &[0., 0.]);
    let mut lls = make_lls(jacobian(), &residuals);
    let gnorm = lm.update_diag(&x, &mut lls).unwrap();
    assert!(gnorm > 0.96 && gnorm < 0.98);
    assert_eq!(lm.target.calls(), &[MockCall::Residuals]);
}

#[test]
fn diag_init_and_second_call() {
    let config = LevenbergMarquardt::new().with_stepbound(42.);
    let (mut lm, x, residuals) = setup(config, &[1.5, 10.]);
    let mut jacobian = jacobian();

    let mut lls = make_lls(jacobian.clone(), &residuals);
    assert!(lm.update_diag(&x, &mut lls).is_ok());
    // set diagonal to the column norms of J
    assert_relative_eq!(
        lm.diag,
        DVector::from_column_slice(&[4.153311931459037, 2.8301943396169813]),
        epsilon = 1e-12
    );
    // xnorm = ||D * x||
    assert_relative_eq!(lm.xnorm, 28.979518629542486, epsilon = 1e-12);
    assert_eq!(lm.delta, lm.xnorm * 42.);
    let delta = lm.delta;

    // change column norms of J
    jacobian[(0, 0)] = 100.;
    jacobian[(0, 1)] = 0.;
    let mut lls = make_lls(jacobian, &residuals);

    lm.iteration = 2;
    lm.xnorm = 123.;
    assert!(lm.update_diag(&x, &mut lls).is_ok());
    // on second call only pick max
    assert_relative_eq!(
        lm.diag,
        DVector::from_column_slice(&[100.08121701897915, 2.8301943396169813]),
        epsilon = 1e-12
    );
    // on second call not touched
    assert_eq!(lm.xnorm, 123.);
    assert_eq!(lm.delta, delta);
}

#[test]
fn nan_jacobian() {
    let (mut lm, x, residuals) = setup(LevenbergMarquardt::new(), &[1., 2.]);
    let mut jacobian = jacobian();
    jacobian[(0, 0)] = f64::NAN;
    let mut lls = make_lls(jacobian, &residuals);
    assert_eq!(lm.update_diag(&x, &mut lls), Err(Status::UserAsked));
}

#[test]
fn zero_x() {
    let config = LevenbergMarquardt::new().with_stepbound(900.);
    let (mut lm, x, residuals) = setup(config, &[0., 0.]);
    let mut lls = make_lls(jacobian(), &residuals);
    assert!(lm.update_diag(&x, &mut lls).is_ok());
    assert_eq!(lm.xnorm, 0.);
    assert_eq!(lm.delta, 900.);
    assert_eq!(lm.target.calls(), &[MockCall::Residuals]);
}

#[test]
fn no_scale_diag() {
    let initial_x = [1.5, 10.];
    let config = LevenbergMarquardt::new()
        .with_scale_diag(false)
        .with_stepbound(0.5);
    let (mut lm, x, residuals) = setup(config, &initial_x);
    let mut jacobian = jacobian();
    let mut lls = make_lls(jacobian.clone(), &residuals);
    assert!(lm.update_diag(&x, &mut lls).is_ok());
    assert_eq!(lm.diag, DVector::from_element(2, 1.));
    // xnorm = ||D * x||
    assert_relative_eq!(lm.xnorm, x.norm(), epsilon = 1e-12);
    assert_eq!(lm.delta, lm.xnorm * 0.5);
    let delta = lm.delta;

    // change column norms of J
    jacobian[(0, 0)] = 100.;
    jacobian[(0, 1)] = 0.;
    let mut lls = make_lls(jacobian, &residuals);

    lm.iteration = 2;
    lm.xnorm = 123.;
    assert!(lm.update_diag(&x, &mut lls).is_ok());
    // on second call still not changed
    assert_eq!(lm.diag, DVector::from_element(2, 1.));
    assert_eq!(lm.xnorm, 123.);
    assert_eq!(lm.delta, delta);
}
