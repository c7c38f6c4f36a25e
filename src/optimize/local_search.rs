//! Integer-native backend: nearest in-band start, capital repair, then
//! single-unit and pairwise descent.

use super::backend::{BackendFailure, BackendOutcome, Solution, SolverBackend};
use super::integer::{self, Integerized};
use super::problem::{Deadline, Problem};

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSearch;

impl LocalSearch {
    pub const NAME: &'static str = "local-search";
}

impl SolverBackend for LocalSearch {
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

        let start: Vec<f64> = problem
            .variables
            .iter()
            .map(|v| v.ideal / v.price)
            .collect();

        Ok(match integer::round_and_repair(problem, &start, deadline) {
            Integerized::Feasible {
                quantities,
                converged,
            } => BackendOutcome::Solved {
                solution: Solution::Integer(quantities),
                converged,
            },
            Integerized::Expired => BackendOutcome::TimeLimit,
            Integerized::Stuck => BackendOutcome::Infeasible,
        })
    }
}
