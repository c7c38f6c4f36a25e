//! Problem formulation: decimal inputs → integer bounds and an f64 objective.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::ValidationError;
use crate::model::Position;
use crate::types::{Quantity, SecurityId};

/// Largest quantity a band bound may hold. Kept within the range where f64
/// represents every integer exactly.
pub const MAX_QUANTITY: Quantity = 1_000_000_000_000_000;

/// One decision variable: the post-rebalance quantity of a modeled security.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub security_id: SecurityId,
    /// Unit price.
    pub price: f64,
    /// Value the position would have exactly on target (`target × MV`).
    pub ideal: f64,
    /// Objective weight (`1 / target`), so misses are measured relative to
    /// the position's own size.
    pub weight: f64,
    /// Smallest in-band integer quantity.
    pub lower: Quantity,
    /// Largest in-band integer quantity.
    pub upper: Quantity,
}

impl Variable {
    /// Weighted squared deviation of quantity `q` from the ideal value.
    pub fn cost(&self, q: f64) -> f64 {
        let d = q * self.price - self.ideal;
        self.weight * d * d
    }
}

/// A separable convex integer program:
///
/// ```text
/// minimize   Σ wᵢ (qᵢ·pᵢ − cᵢ)²
/// subject to lowerᵢ ≤ qᵢ ≤ upperᵢ,  qᵢ integer
///            Σ qᵢ·pᵢ ≤ budget
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Problem {
    pub variables: Vec<Variable>,
    /// Capital available to modeled positions.
    pub budget: f64,
}

/// Why a problem can be rejected before any backend runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presolve {
    Ready,
    /// Some drift band contains no integer quantity.
    EmptyBand,
    /// Buying every position at its lower bound already exceeds the budget.
    BudgetTooSmall,
}

impl Problem {
    /// Formulate from validated decimal inputs. `prices` must hold a positive
    /// price for every position; `budget` may be negative if held positions
    /// already exceed market value.
    ///
    /// Fails with [`ValidationError::QuantityOutOfRange`] when a band bound
    /// would need more than [`MAX_QUANTITY`] units.
    pub fn formulate<'a>(
        positions: impl IntoIterator<Item = (&'a Position, Decimal)>,
        market_value: Decimal,
        budget: Decimal,
    ) -> Result<Self, ValidationError> {
        let variables = positions
            .into_iter()
            .map(|(position, price)| {
                let target = position.target.value();
                let min_value = (target - position.drift.low()) * market_value;
                let max_value = (target + position.drift.high()) * market_value;
                let out_of_range = || ValidationError::QuantityOutOfRange {
                    security: position.security_id,
                    price,
                    limit: MAX_QUANTITY,
                };
                Ok(Variable {
                    security_id: position.security_id,
                    price: to_f64(price),
                    ideal: to_f64(target * market_value),
                    weight: 1.0 / to_f64(target),
                    lower: min_quantity(min_value, price).ok_or_else(out_of_range)?,
                    upper: max_quantity(max_value, price).ok_or_else(out_of_range)?,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            variables,
            budget: to_f64(budget),
        })
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Cheap infeasibility checks that need no search.
    pub fn presolve(&self) -> Presolve {
        if self.variables.iter().any(|v| v.lower > v.upper) {
            return Presolve::EmptyBand;
        }
        if self.spend_at(|v| v.lower) > self.budget {
            return Presolve::BudgetTooSmall;
        }
        Presolve::Ready
    }

    /// Total value of an integer assignment.
    pub fn spend(&self, quantities: &[Quantity]) -> f64 {
        self.variables
            .iter()
            .zip(quantities)
            .map(|(v, &q)| q as f64 * v.price)
            .sum()
    }

    pub fn objective(&self, quantities: &[Quantity]) -> f64 {
        self.variables
            .iter()
            .zip(quantities)
            .map(|(v, &q)| v.cost(q as f64))
            .sum()
    }

    fn spend_at(&self, pick: impl Fn(&Variable) -> Quantity) -> f64 {
        self.variables
            .iter()
            .map(|v| pick(v) as f64 * v.price)
            .sum()
    }
}

/// Smallest integer `q ≥ 0` with `q × price ≥ min_value`; `None` if it
/// exceeds [`MAX_QUANTITY`].
fn min_quantity(min_value: Decimal, price: Decimal) -> Option<Quantity> {
    if min_value <= Decimal::ZERO {
        return Some(0);
    }
    let mut q = units(min_value.checked_div(price)?.ceil())?;
    // Division rounds at 28 digits; settle the edge exactly.
    while q > 0 && value_of(q - 1, price) >= min_value {
        q -= 1;
    }
    while value_of(q, price) < min_value {
        q = units(Decimal::from(q + 1))?;
    }
    Some(q)
}

/// Largest integer `q` with `q × price ≤ max_value`; `-1` if none is `≥ 0`,
/// `None` if it exceeds [`MAX_QUANTITY`].
fn max_quantity(max_value: Decimal, price: Decimal) -> Option<Quantity> {
    if max_value < Decimal::ZERO {
        return Some(-1);
    }
    let mut q = units(max_value.checked_div(price)?.floor())?;
    while q >= 0 && value_of(q, price) > max_value {
        q -= 1;
    }
    while value_of(q + 1, price) <= max_value {
        q = units(Decimal::from(q + 1))?;
    }
    Some(q)
}

fn units(q: Decimal) -> Option<Quantity> {
    q.to_i64().filter(|q| *q <= MAX_QUANTITY)
}

/// `q × price`, saturating at the top of the decimal range.
fn value_of(q: Quantity, price: Decimal) -> Decimal {
    Decimal::from(q).saturating_mul(price)
}

pub(crate) fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

/// Cooperative wall-clock limit checked by backends between iterations.
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline `timeout` from now. A timeout too large to represent never
    /// expires.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn never() -> Self {
        Self(None)
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}
