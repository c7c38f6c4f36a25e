//! Integer rounding, capital repair, and unit-move improvement.
//!
//! Shared by the engine (to integerize continuous backend output) and by the
//! local-search backend (which never leaves integer space).

use log::warn;

use super::problem::{Deadline, Problem, Variable};
use crate::types::Quantity;

/// Upper limit on improvement moves per solve.
const MAX_MOVES: usize = 100_000;

/// Result of turning a starting point into a feasible integer assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Integerized {
    Feasible {
        quantities: Vec<Quantity>,
        converged: bool,
    },
    /// The deadline passed before the capital constraint was met.
    Expired,
    /// No unit could be released to meet the capital constraint.
    Stuck,
}

/// Nearest integer to `x` inside the variable's band.
pub fn clamp_round(x: f64, v: &Variable) -> Quantity {
    let q = if x.is_finite() { x.round() as Quantity } else { v.lower };
    q.clamp(v.lower, v.upper.max(v.lower))
}

/// Round fractional quantities, repair the capital constraint, then improve
/// by unit moves until no move helps or the deadline passes.
pub fn round_and_repair(problem: &Problem, start: &[f64], deadline: Deadline) -> Integerized {
    let quantities = problem
        .variables
        .iter()
        .zip(start)
        .map(|(v, &x)| clamp_round(x, v))
        .collect();
    settle(problem, quantities, deadline)
}

/// Repair then improve an integer starting point already inside the bands.
pub fn settle(problem: &Problem, mut quantities: Vec<Quantity>, deadline: Deadline) -> Integerized {
    let mut spend = problem.spend(&quantities);

    while !fits(spend, problem.budget) {
        if deadline.expired() {
            return Integerized::Expired;
        }
        match cheapest_release(problem, &quantities) {
            Some(i) => {
                quantities[i] -= 1;
                spend -= problem.variables[i].price;
            }
            None => return Integerized::Stuck,
        }
    }

    let converged = improve(problem, &mut quantities, spend, deadline);
    Integerized::Feasible {
        quantities,
        converged,
    }
}

/// Largest f64 slack on the capital check, below the decimal
/// `VALUE_TOLERANCE` so a point accepted here also passes re-validation.
const MAX_SLACK: f64 = 1e-7;

/// Whether `spend` is within `budget`, allowing for f64 summation noise.
/// Exact compliance is re-checked in decimal arithmetic afterwards.
pub fn fits(spend: f64, budget: f64) -> bool {
    spend <= budget + (budget.abs() * 1e-12).min(MAX_SLACK)
}

/// Index of the unit whose removal costs the least objective per unit of
/// capital freed.
fn cheapest_release(problem: &Problem, quantities: &[Quantity]) -> Option<usize> {
    problem
        .variables
        .iter()
        .zip(quantities)
        .enumerate()
        .filter(|(_, (v, q))| **q > v.lower)
        .map(|(i, (v, &q))| {
            let delta = v.cost((q - 1) as f64) - v.cost(q as f64);
            (i, delta / v.price)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Greedy descent over single-unit and pairwise moves. Returns false if cut
/// short by the deadline or the move limit.
fn improve(problem: &Problem, quantities: &mut [Quantity], mut spend: f64, deadline: Deadline) -> bool {
    let vars = &problem.variables;

    for _ in 0..MAX_MOVES {
        if deadline.expired() {
            warn!("Deadline reached while improving integer solution");
            return false;
        }

        let up: Vec<Option<f64>> = vars
            .iter()
            .zip(quantities.iter())
            .map(|(v, &q)| (q < v.upper).then(|| v.cost((q + 1) as f64) - v.cost(q as f64)))
            .collect();
        let down: Vec<Option<f64>> = vars
            .iter()
            .zip(quantities.iter())
            .map(|(v, &q)| (q > v.lower).then(|| v.cost((q - 1) as f64) - v.cost(q as f64)))
            .collect();

        // (delta, buy, sell)
        let mut best: Option<(f64, Option<usize>, Option<usize>)> = None;
        let mut consider = |delta: f64, buy: Option<usize>, sell: Option<usize>| {
            if best.is_none_or(|(d, _, _)| delta < d) {
                best = Some((delta, buy, sell));
            }
        };

        for i in 0..vars.len() {
            if let Some(d) = up[i] {
                if fits(spend + vars[i].price, problem.budget) {
                    consider(d, Some(i), None);
                }
            }
            if let Some(d) = down[i] {
                consider(d, None, Some(i));
            }
        }
        for (i, sell) in down.iter().enumerate() {
            let Some(ds) = sell else { continue };
            for (j, buy) in up.iter().enumerate() {
                let Some(db) = buy else { continue };
                if i == j {
                    continue;
                }
                if fits(spend - vars[i].price + vars[j].price, problem.budget) {
                    consider(ds + db, Some(j), Some(i));
                }
            }
        }

        let objective = problem.objective(quantities);
        match best {
            Some((delta, buy, sell)) if delta < -1e-12 * (1.0 + objective) => {
                if let Some(j) = buy {
                    quantities[j] += 1;
                    spend += vars[j].price;
                }
                if let Some(i) = sell {
                    quantities[i] -= 1;
                    spend -= vars[i].price;
                }
            }
            _ => return true,
        }
    }

    warn!("Move limit reached while improving integer solution");
    false
}
