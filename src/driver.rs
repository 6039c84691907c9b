//! State machine running an engine from initialization to a terminal status.
use nalgebra::DVector;
use tracing::debug;

use crate::lm::{Status, StepEngine};

/// Where a [`Driver`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The engine was not initialized yet.
    Uninitialized,
    /// Initialization succeeded and steps are being taken.
    Running,
    /// The run ended with the given status.
    Terminated(Status),
}

/// Drives a [`StepEngine`] and reports every accepted step to an observer.
///
/// Each [`run`](Driver::run) starts from [`Phase::Uninitialized`]. A status
/// other than [`Status::NotStarted`] after initialization ends the run
/// without any step, and the first step status other than
/// [`Status::Running`] ends it afterwards.
pub struct Driver<E> {
    engine: E,
    phase: Phase,
    steps: usize,
}

impl<E: StepEngine> Driver<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            phase: Phase::Uninitialized,
            steps: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of steps that returned [`Status::Running`] in the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Minimize starting at `x` and return the terminal status.
    ///
    /// After every step that returns [`Status::Running`], `observer` gets
    /// the step index counted from one, the current `x` and the current
    /// cost `$\|\vec{r}\|^2$`.
    pub fn run<F>(&mut self, x: &mut DVector<f64>, mut observer: F) -> Status
    where
        F: FnMut(usize, &DVector<f64>, f64),
    {
        self.phase = Phase::Uninitialized;
        self.steps = 0;

        let status = self.engine.minimize_init(x);
        if status != Status::NotStarted {
            debug!(?status, "engine initialization stopped the run");
            return self.terminate(status);
        }
        self.phase = Phase::Running;

        loop {
            let status = self.engine.minimize_one_step(x);
            if status != Status::Running {
                return self.terminate(status);
            }
            self.steps += 1;
            let value = self.engine.fnorm().powi(2);
            debug!(step = self.steps, value, "accepted step");
            observer(self.steps, x, value);
        }
    }

    fn terminate(&mut self, status: Status) -> Status {
        self.phase = Phase::Terminated(status);
        status
    }
}
