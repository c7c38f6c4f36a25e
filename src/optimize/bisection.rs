//! Continuous relaxation solved by bisection on the capital multiplier.
//!
//! The relaxed problem is separable with a single coupling constraint, so for
//! a multiplier `λ ≥ 0` each value has the closed form
//! `vᵢ(λ) = clamp(cᵢ − λ / 2wᵢ, Lᵢ, Uᵢ)`, and total spend is non-increasing
//! in `λ`. Bisection finds the smallest `λ` whose spend fits the budget.

use super::backend::{BackendFailure, BackendOutcome, Solution, SolverBackend};
use super::problem::{Deadline, Problem, Variable};

#[derive(Clone, Copy, Debug)]
pub struct DualBisection {
    pub max_iterations: usize,
}

impl DualBisection {
    pub const NAME: &'static str = "dual-bisection";
}

impl Default for DualBisection {
    fn default() -> Self {
        Self {
            max_iterations: 200,
        }
    }
}

impl SolverBackend for DualBisection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn solve(
        &self,
        problem: &Problem,
        deadline: Deadline,
    ) -> Result<BackendOutcome, BackendFailure> {
        if deadline.expired() {
            return Ok(BackendOutcome::TimeLimit);
        }
        if problem.variables.iter().any(|v| v.lower > v.upper) {
            return Ok(BackendOutcome::Infeasible);
        }

        let floor: f64 = problem
            .variables
            .iter()
            .map(|v| v.lower as f64 * v.price)
            .sum();
        if floor > problem.budget {
            return Ok(BackendOutcome::Infeasible);
        }

        let mut lambda = 0.0;
        if spend_at(problem, 0.0) > problem.budget {
            // At `hi` every value sits on its lower edge, which fits.
            let mut lo = 0.0_f64;
            let mut hi = problem
                .variables
                .iter()
                .map(|v| 2.0 * v.weight * (v.ideal - v.lower as f64 * v.price))
                .fold(1.0_f64, f64::max);

            for _ in 0..self.max_iterations {
                if deadline.expired() {
                    return Ok(BackendOutcome::TimeLimit);
                }
                let mid = 0.5 * (lo + hi);
                if spend_at(problem, mid) > problem.budget {
                    lo = mid;
                } else {
                    hi = mid;
                }
                if hi - lo <= 1e-12 * hi.max(1.0) {
                    break;
                }
            }
            lambda = hi;
        }

        let quantities: Vec<f64> = problem
            .variables
            .iter()
            .map(|v| value_at(v, lambda) / v.price)
            .collect();

        if let Some(bad) = quantities.iter().position(|q| !q.is_finite()) {
            return Err(BackendFailure(format!(
                "non-finite quantity for {}",
                problem.variables[bad].security_id
            )));
        }

        Ok(BackendOutcome::Solved {
            solution: Solution::Continuous(quantities),
            converged: true,
        })
    }
}

/// Optimal relaxed value of one variable for multiplier `lambda`.
fn value_at(v: &Variable, lambda: f64) -> f64 {
    let lower = v.lower as f64 * v.price;
    let upper = v.upper as f64 * v.price;
    (v.ideal - lambda / (2.0 * v.weight)).clamp(lower, upper)
}

fn spend_at(problem: &Problem, lambda: f64) -> f64 {
    problem.variables.iter().map(|v| value_at(v, lambda)).sum()
}
