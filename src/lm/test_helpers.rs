use core::cell::RefCell;

use nalgebra::{DMatrix, DVector};

use crate::lm::ResidualFunctor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Residuals,
    Jacobian,
    JacobianRow(usize),
}

/// Functor replaying prepared residuals and Jacobians.
#[derive(Clone)]
pub struct MockFunctor {
    inputs: usize,
    values: usize,
    call_history: RefCell<Vec<MockCall>>,
    pub params: Vec<DVector<f64>>,
    residuals: Vec<Option<DVector<f64>>>,
    residuals_index: usize,
    jacobians: Vec<Option<DMatrix<f64>>>,
    jacobians_index: usize,
}

impl MockFunctor {
    pub fn new(inputs: usize, values: usize, residuals: Vec<Option<DVector<f64>>>) -> Self {
        Self {
            inputs,
            values,
            residuals,
            jacobians: vec![],
            call_history: RefCell::new(vec![]),
            params: vec![],
            residuals_index: 0,
            jacobians_index: 0,
        }
    }

    pub fn with_jacobians(self, jacobians: Vec<Option<DMatrix<f64>>>) -> Self {
        Self { jacobians, ..self }
    }

    pub fn calls(&mut self) -> &[MockCall] {
        self.call_history.get_mut().as_slice()
    }
}

impl ResidualFunctor for MockFunctor {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn values(&self) -> usize {
        self.values
    }

    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        self.params.push(x.clone());
        self.call_history.borrow_mut().push(MockCall::Residuals);
        let residuals = self.residuals.get(self.residuals_index).cloned().flatten();
        self.residuals_index += 1;
        residuals
    }

    fn jacobian(&mut self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
        self.call_history.borrow_mut().push(MockCall::Jacobian);
        let jacobian = self.jacobians.get(self.jacobians_index).cloned().flatten();
        self.jacobians_index += 1;
        jacobian
    }

    fn jacobian_row(&mut self, _x: &DVector<f64>, row: usize) -> Option<DVector<f64>> {
        self.call_history.borrow_mut().push(MockCall::JacobianRow(row));
        self.jacobians
            .get(self.jacobians_index)
            .cloned()
            .flatten()
            .map(|j| j.row(row).transpose())
    }
}
