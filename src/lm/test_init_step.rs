use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use super::test_helpers::{MockCall, MockFunctor};
use super::{JacobianMode, LevenbergMarquardt, Status, StepEngine, LM};

fn vector(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

fn init(config: LevenbergMarquardt, problem: MockFunctor, x: &[f64]) -> (LM<MockFunctor>, Status) {
    let mut lm = LM::new(config, problem);
    let status = lm.minimize_init(&mut vector(x));
    (lm, status)
}

#[test]
fn none_or_nan_residuals() {
    // residuals return None
    let (mut lm, status) = init(LevenbergMarquardt::new(), MockFunctor::new(2, 3, vec![]), &[0., 0.]);
    assert_eq!(status, Status::UserAsked);
    assert_eq!(lm.nfev(), 1);
    assert_eq!(lm.target.calls(), [MockCall::Residuals].as_ref());

    // residuals of the wrong length
    let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 1.]))]);
    let (lm, status) = init(LevenbergMarquardt::new(), problem, &[0., 0.]);
    assert_eq!(status, Status::UserAsked);
    assert_eq!(lm.nfev(), 1);

    // residuals return nan or inf
    for bad in [f64::NAN, f64::INFINITY] {
        let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 1., bad]))]);
        let (lm, status) = init(LevenbergMarquardt::new(), problem, &[0., 0.]);
        assert_eq!(status, Status::UserAsked);
        assert_eq!(lm.nfev(), 1);
    }
}

#[test]
fn improper_dimensions() {
    // no parameters
    let problem = MockFunctor::new(0, 3, vec![Some(vector(&[1., 1., 1.]))]);
    let (mut lm, status) = init(LevenbergMarquardt::new(), problem, &[]);
    assert_eq!(status, Status::ImproperInputParameters);
    assert!(lm.target.calls().is_empty());

    // too few residuals
    let problem = MockFunctor::new(3, 2, vec![Some(vector(&[1., 1.]))]);
    let (mut lm, status) = init(LevenbergMarquardt::new(), problem, &[0., 0., 0.]);
    assert_eq!(status, Status::ImproperInputParameters);
    assert!(lm.target.calls().is_empty());
    assert_eq!(lm.nfev(), 0);

    // starting point does not match the functor
    let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 1., 1.]))]);
    let (_, status) = init(LevenbergMarquardt::new(), problem, &[0., 0., 0.]);
    assert_eq!(status, Status::ImproperInputParameters);
}

#[test]
fn improper_configuration() {
    let configs = [
        LevenbergMarquardt::new().with_ftol(-1.),
        LevenbergMarquardt::new().with_xtol(-1e-9),
        LevenbergMarquardt::new().with_gtol(-0.5),
        LevenbergMarquardt::new().with_stepbound(0.),
        LevenbergMarquardt::new().with_stepbound(-100.),
        LevenbergMarquardt::new().with_stepbound(f64::NAN),
        LevenbergMarquardt::new().with_patience(0),
    ];
    for config in configs {
        let problem = MockFunctor::new(2, 2, vec![Some(vector(&[1., 1.]))]);
        let (mut lm, status) = init(config, problem, &[1., 1.]);
        assert_eq!(status, Status::ImproperInputParameters, "{:?}", config);
        assert!(lm.target.calls().is_empty());
    }
}

#[test]
fn initial_diagonal_and_residual() {
    let problem = MockFunctor::new(2, 2, vec![Some(vector(&[0.5, 1.]))]);
    let (mut lm, status) = init(LevenbergMarquardt::new(), problem, &[2., 2.]);
    assert_eq!(status, Status::NotStarted);
    assert_eq!(lm.target.calls(), [MockCall::Residuals].as_ref());
    assert_eq!(lm.diag, vector(&[1., 1.]));
    assert_relative_eq!(lm.fnorm(), vector(&[0.5, 1.]).norm());
    assert_eq!(lm.nfev(), 1);
    assert_eq!(lm.njev(), 0);
    assert_eq!(lm.iterations(), 0);
}

#[test]
fn zero_residuals_stop_at_first_step() {
    let problem = MockFunctor::new(2, 3, vec![Some(DVector::zeros(3))])
        .with_jacobians(vec![Some(DMatrix::from_row_slice(3, 2, &[1., 2., 4., -2., 0.5, 0.1]))]);
    let mut lm = LM::new(LevenbergMarquardt::new(), problem);
    let mut x = vector(&[1., 2.]);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    assert_eq!(lm.minimize_one_step(&mut x), Status::CosinusTooSmall);
    assert_eq!(lm.fnorm(), 0.);
    assert_eq!(x, vector(&[1., 2.]));
    assert_eq!(
        lm.target.calls(),
        [MockCall::Residuals, MockCall::Jacobian].as_ref()
    );
}

#[test]
fn failing_jacobian() {
    let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 2., 0.5]))]).with_jacobians(vec![None]);
    let mut lm = LM::new(LevenbergMarquardt::new(), problem);
    let mut x = vector(&[1., 2.]);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    assert_eq!(lm.minimize_one_step(&mut x), Status::UserAsked);
    assert_eq!(lm.njev(), 1);

    // Jacobian of the wrong shape
    let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 2., 0.5]))])
        .with_jacobians(vec![Some(DMatrix::zeros(2, 2))]);
    let mut lm = LM::new(LevenbergMarquardt::new(), problem);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    assert_eq!(lm.minimize_one_step(&mut x), Status::UserAsked);
}

#[test]
fn failing_residuals_during_step() {
    let problem = MockFunctor::new(2, 3, vec![Some(vector(&[1., 2., 0.5])), None])
        .with_jacobians(vec![Some(DMatrix::from_row_slice(3, 2, &[1., 2., 4., -2., 0.5, 0.1]))]);
    let mut lm = LM::new(LevenbergMarquardt::new(), problem);
    let mut x = vector(&[1., 2.]);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    assert_eq!(lm.minimize_one_step(&mut x), Status::UserAsked);
    assert_eq!(lm.nfev(), 2);
    // x stays untouched
    assert_eq!(x, vector(&[1., 2.]));
}

#[test]
fn row_wise_jacobian_uses_every_row() {
    let problem = MockFunctor::new(2, 3, vec![Some(DVector::zeros(3))])
        .with_jacobians(vec![Some(DMatrix::from_row_slice(3, 2, &[1., 2., 4., -2., 0.5, 0.1]))]);
    let config = LevenbergMarquardt::new().with_jacobian_mode(JacobianMode::RowWise);
    let mut lm = LM::new(config, problem);
    let mut x = vector(&[1., 2.]);
    assert_eq!(lm.minimize_init(&mut x), Status::NotStarted);
    assert_eq!(lm.minimize_one_step(&mut x), Status::CosinusTooSmall);
    assert_eq!(
        lm.target.calls(),
        [
            MockCall::Residuals,
            MockCall::JacobianRow(0),
            MockCall::JacobianRow(1),
            MockCall::JacobianRow(2),
        ]
        .as_ref()
    );
}
