//! Solver backends and the one-time backend selection.

use log::{debug, warn};

use super::bisection::DualBisection;
use super::local_search::LocalSearch;
use super::problem::{Deadline, Problem};
use crate::error::OptimizationError;
use crate::types::Quantity;

/// Backend names in fallback order.
pub const BACKEND_PRIORITY: [&str; 2] = [DualBisection::NAME, LocalSearch::NAME];

/// A backend's answer for one problem.
#[derive(Clone, Debug, PartialEq)]
pub enum Solution {
    /// Fractional quantities; the engine must integerize and re-validate.
    Continuous(Vec<f64>),
    /// Whole quantities, one per variable.
    Integer(Vec<Quantity>),
}

impl Solution {
    pub fn len(&self) -> usize {
        match self {
            Solution::Continuous(x) => x.len(),
            Solution::Integer(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendOutcome {
    /// `converged` is false when the deadline cut the search short after a
    /// feasible point was already in hand.
    Solved { solution: Solution, converged: bool },
    Infeasible,
    /// The deadline passed before any feasible point was found.
    TimeLimit,
}

/// An internal failure reported by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendFailure(pub String);

/// A numerical method for the rebalancing [`Problem`].
///
/// Backends must poll `deadline` between iterations; the engine never
/// interrupts them.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn is_available(&self) -> bool {
        true
    }

    fn solve(&self, problem: &Problem, deadline: Deadline)
    -> Result<BackendOutcome, BackendFailure>;
}

/// Every compiled-in backend, in [`BACKEND_PRIORITY`] order.
pub fn registered() -> Vec<Box<dyn SolverBackend>> {
    vec![
        Box::new(DualBisection::default()),
        Box::new(LocalSearch::default()),
    ]
}

/// Names of backends that can currently run.
pub fn available_names() -> Vec<&'static str> {
    registered()
        .iter()
        .filter(|b| b.is_available())
        .map(|b| b.name())
        .collect()
}

/// Pick the preferred backend if it is registered and available, else the
/// first available backend in priority order.
pub fn select(preferred: Option<&str>) -> Result<Box<dyn SolverBackend>, OptimizationError> {
    let mut candidates: Vec<Box<dyn SolverBackend>> =
        registered().into_iter().filter(|b| b.is_available()).collect();

    if let Some(name) = preferred {
        if let Some(idx) = candidates.iter().position(|b| b.name() == name) {
            debug!("Using preferred solver backend {name}");
            return Ok(candidates.swap_remove(idx));
        }
        warn!("Solver backend '{name}' unavailable, falling back to priority order");
    }

    if candidates.is_empty() {
        return Err(OptimizationError::NoBackendAvailable);
    }
    let backend = candidates.remove(0);
    debug!("Using solver backend {}", backend.name());
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_matches_registration_order() {
        let names: Vec<_> = registered().iter().map(|b| b.name()).collect();
        assert_eq!(names, BACKEND_PRIORITY.to_vec());
    }

    #[test]
    fn select_preferred() {
        let b = select(Some("local-search")).unwrap();
        assert_eq!(b.name(), "local-search");
    }

    #[test]
    fn select_unknown_falls_back() {
        let b = select(Some("gurobi")).unwrap();
        assert_eq!(b.name(), "dual-bisection");
    }

    #[test]
    fn select_default() {
        assert_eq!(select(None).unwrap().name(), BACKEND_PRIORITY[0]);
    }

    #[test]
    fn all_available() {
        assert_eq!(available_names(), BACKEND_PRIORITY.to_vec());
    }
}
