//! Registration of the solver under a name.
//!
//! Hosts that select solvers at runtime look them up in a [`SolverRegistry`].
//! The free functions mirror the entry points such a host queries.
use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{ConstructionError, RegistryError};
use crate::problem::{ConstraintList, OptimizationProblem};
use crate::solver::Solver;

/// Name the Levenberg-Marquardt solver is registered under.
pub const PLUGIN_NAME: &str = "levenberg-marquardt";

/// Builds a solver for a problem.
pub type SolverFactory =
    for<'a> fn(&'a OptimizationProblem) -> Result<Box<Solver<'a>>, ConstructionError>;

/// Size in bytes of the problem type the solver accepts.
pub fn problem_size() -> usize {
    std::mem::size_of::<OptimizationProblem>()
}

/// Name of the constraint list type the solver accepts.
pub fn constraints_type_tag() -> &'static str {
    std::any::type_name::<ConstraintList>()
}

pub fn create(problem: &OptimizationProblem) -> Result<Box<Solver<'_>>, ConstructionError> {
    Solver::new(problem).map(Box::new)
}

pub fn destroy(solver: Box<Solver<'_>>) {
    drop(solver);
}

/// Solver factories keyed by name.
#[derive(Clone, Default)]
pub struct SolverRegistry {
    factories: BTreeMap<String, SolverFactory>,
}

impl SolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Levenberg-Marquardt solver under [`PLUGIN_NAME`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PLUGIN_NAME, create);
        registry
    }

    /// Register `factory` under `name`, returning the factory it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: SolverFactory,
    ) -> Option<SolverFactory> {
        let name = name.into();
        debug!(%name, "registering solver");
        self.factories.insert(name, factory)
    }

    pub fn create<'a>(
        &self,
        name: &str,
        problem: &'a OptimizationProblem,
    ) -> Result<Box<Solver<'a>>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownSolver(name.to_owned()))?;
        Ok(factory(problem)?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
