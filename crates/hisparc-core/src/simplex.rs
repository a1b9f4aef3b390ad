//! Downhill simplex (Nelder–Mead) minimisation on top of argmin.

use std::cell::{Cell, RefCell};

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use serde::Serialize;
use tracing::debug;

use crate::error::{ShowerError, ShowerResult};

/// Relative step of the initial simplex along each coordinate.
const INITIAL_STEP: f64 = 0.05;
/// Initial step for a coordinate that starts at zero.
const ZERO_STEP: f64 = 0.00025;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexOptions {
    /// Standard deviation of the vertex values at convergence.
    pub ftol: f64,
    /// Defaults to `200 · n` when unset.
    pub max_iterations: Option<usize>,
    /// Defaults to `200 · n` when unset.
    pub max_evaluations: Option<usize>,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-4,
            max_iterations: None,
            max_evaluations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    /// False when an iteration or evaluation limit stopped the search.
    pub converged: bool,
}

/// Counts evaluations against a budget and remembers the best point seen,
/// so a search cut short by the budget still has a result.
struct Objective<F> {
    f: F,
    budget: usize,
    evaluations: Cell<usize>,
    exhausted: Cell<bool>,
    best: RefCell<(Vec<f64>, f64)>,
}

impl<F: Fn(&[f64]) -> f64> CostFunction for &Objective<F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        if self.evaluations.get() >= self.budget {
            self.exhausted.set(true);
            return Err(Error::msg("evaluation budget exhausted"));
        }
        self.evaluations.set(self.evaluations.get() + 1);

        let v = (self.f)(x);
        let v = if v.is_nan() { f64::INFINITY } else { v };
        let mut best = self.best.borrow_mut();
        if v < best.1 || best.0.is_empty() {
            *best = (x.clone(), v);
        }
        Ok(v)
    }
}

/// Vertices of the starting simplex: `x0` plus one point per coordinate,
/// stepped by 5 % (or by a small absolute step from zero).
fn initial_simplex(x0: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(x0.len() + 1);
    vertices.push(x0.to_vec());
    for k in 0..x0.len() {
        let mut y = x0.to_vec();
        y[k] = if y[k] != 0.0 {
            (1.0 + INITIAL_STEP) * y[k]
        } else {
            ZERO_STEP
        };
        vertices.push(y);
    }
    vertices
}

/// Minimise `f` starting from `x0`. NaN values count as +∞.
pub fn minimize(
    f: impl Fn(&[f64]) -> f64,
    x0: &[f64],
    options: &SimplexOptions,
) -> ShowerResult<Minimum> {
    if x0.is_empty() {
        return Err(ShowerError::InvalidInput(
            "cannot minimise over zero parameters".into(),
        ));
    }
    let n = x0.len();
    let max_iterations = options.max_iterations.unwrap_or(200 * n) as u64;
    let objective = Objective {
        f,
        budget: options.max_evaluations.unwrap_or(200 * n),
        evaluations: Cell::new(0),
        exhausted: Cell::new(false),
        best: RefCell::new((Vec::new(), f64::INFINITY)),
    };

    let solver = NelderMead::new(initial_simplex(x0))
        .with_sd_tolerance(options.ftol)
        .map_err(|e| ShowerError::Fit(e.to_string()))?;
    let outcome = Executor::new(&objective, solver)
        .configure(|state| state.max_iters(max_iterations))
        .run();

    let converged = match outcome {
        Ok(res) => {
            let state = res.state();
            debug!(
                iterations = state.get_iter(),
                reason = ?state.get_termination_reason(),
                "simplex finished"
            );
            matches!(
                state.get_termination_reason(),
                Some(TerminationReason::SolverConverged)
            )
        }
        Err(_) if objective.exhausted.get() => {
            debug!(budget = objective.budget, "simplex evaluation budget exhausted");
            false
        }
        Err(e) => return Err(ShowerError::Fit(e.to_string())),
    };

    let evaluations = objective.evaluations.get();
    let (x, value) = objective.best.into_inner();
    Ok(Minimum {
        x,
        value,
        evaluations,
        converged,
    })
}
