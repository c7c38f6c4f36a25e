//! Rebalancing optimizer: integer post-trade quantities under drift bands and
//! a capital limit.
//!
//! The engine formulates a separable convex integer program (see
//! [`Problem`]), hands it to a [`SolverBackend`] chosen once at construction,
//! integerizes continuous output, and re-validates every answer in decimal
//! arithmetic before returning it.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! use driftwise::optimize::{OptimizationEngine, SolverConfig};
//! use driftwise::{DriftBounds, InvestmentModel, Position, SecurityId, TargetPercentage};
//! use rust_decimal_macros::dec;
//!
//! let id = SecurityId::new("AAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
//! let mut model = InvestmentModel::new("m1", "Single fund").unwrap();
//! model
//!     .add_position(Position::new(
//!         id,
//!         TargetPercentage::new(dec!(0.5)).unwrap(),
//!         DriftBounds::symmetric(dec!(0.05)).unwrap(),
//!     ))
//!     .unwrap();
//!
//! let engine = OptimizationEngine::new(SolverConfig::default()).unwrap();
//! let prices = BTreeMap::from([(id, dec!(20))]);
//! let result = engine
//!     .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(10000), Duration::from_secs(1))
//!     .unwrap();
//!
//! assert!(result.is_feasible);
//! assert_eq!(result.optimal_quantities[&id], 250);
//! ```

pub mod backend;
mod bisection;
mod integer;
mod local_search;
pub mod problem;
mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub use backend::{
    BACKEND_PRIORITY, BackendFailure, BackendOutcome, Solution, SolverBackend,
};
pub use bisection::DualBisection;
pub use local_search::LocalSearch;
pub use problem::{Deadline, MAX_QUANTITY, Presolve, Problem, Variable};
pub use validate::{VALUE_TOLERANCE, Violation, objective_value, validate_solution, violations};

use crate::error::{OptimizationError, Result, ValidationError};
use crate::model::{InvestmentModel, Position};
use crate::target::{DriftBounds, TargetPercentage};
use crate::types::{CurrentHoldings, PriceTable, Quantity, SecurityId};
use integer::Integerized;

/// Terminal state of one solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SolverStatus {
    Optimal,
    /// Feasible, but the search was cut short by the deadline.
    OptimalInaccurate,
    Infeasible,
    /// A relaxed solution existed but no integer point passed validation.
    InfeasibleInaccurate,
    TimeLimit,
    /// Never produced by [`OptimizationEngine`]: backend failures surface as
    /// [`OptimizationError`]. Kept so the status set matches external solvers.
    Error,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::OptimalInaccurate => "optimal_inaccurate",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::InfeasibleInaccurate => "infeasible_inaccurate",
            SolverStatus::TimeLimit => "time_limit",
            SolverStatus::Error => "error",
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, SolverStatus::Optimal | SolverStatus::OptimalInaccurate)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a held security the model does not mention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UnmodeledPolicy {
    /// Implicit target 0 with a `[0, 0]` band: sell it all.
    #[default]
    Liquidate,
    /// Keep the current quantity; its value is reserved out of capital.
    Hold,
}

/// Immutable engine configuration, resolved once at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolverConfig {
    /// Backend to try first; falls back to [`BACKEND_PRIORITY`] order.
    pub preferred_backend: Option<String>,
    pub unmodeled: UnmodeledPolicy,
}

/// Outcome of [`OptimizationEngine::optimize_portfolio`].
///
/// Feasible results always carry an objective value; infeasible ones carry
/// neither quantities nor an objective.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OptimizationResult {
    pub optimal_quantities: BTreeMap<SecurityId, Quantity>,
    pub objective_value: Option<Decimal>,
    pub solver_status: SolverStatus,
    pub solve_time_seconds: f64,
    pub is_feasible: bool,
    pub backend: &'static str,
}

impl OptimizationResult {
    fn feasible(
        optimal_quantities: BTreeMap<SecurityId, Quantity>,
        objective_value: Decimal,
        solver_status: SolverStatus,
        elapsed: Duration,
        backend: &'static str,
    ) -> Self {
        Self {
            optimal_quantities,
            objective_value: Some(objective_value),
            solver_status,
            solve_time_seconds: elapsed.as_secs_f64(),
            is_feasible: true,
            backend,
        }
    }

    fn unsolved(solver_status: SolverStatus, elapsed: Duration, backend: &'static str) -> Self {
        Self {
            optimal_quantities: BTreeMap::new(),
            objective_value: None,
            solver_status,
            solve_time_seconds: elapsed.as_secs_f64(),
            is_feasible: false,
            backend,
        }
    }
}

/// Backend identity and what else could have been selected.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SolverInfo {
    pub backend: &'static str,
    pub version: &'static str,
    pub available: Vec<&'static str>,
}

impl fmt::Display for SolverInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} (available: {})",
            self.backend,
            self.version,
            self.available.join(", ")
        )
    }
}

/// One self-contained problem for [`OptimizationEngine::optimize_batch`].
#[derive(Clone, Debug)]
pub struct OptimizationRequest {
    pub current: CurrentHoldings,
    pub model: InvestmentModel,
    pub prices: PriceTable,
    pub market_value: Decimal,
    pub timeout: Duration,
}

const HEALTH_SECURITY: &str = "HEALTHCHECK0000000000000";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Solves rebalancing problems with a backend fixed at construction.
///
/// Holds no per-call state, so one engine can serve concurrent callers.
pub struct OptimizationEngine {
    backend: Box<dyn SolverBackend>,
    config: SolverConfig,
}

impl fmt::Debug for OptimizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationEngine")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl OptimizationEngine {
    pub fn new(config: SolverConfig) -> std::result::Result<Self, OptimizationError> {
        let backend = backend::select(config.preferred_backend.as_deref())?;
        Ok(Self { backend, config })
    }

    /// Use a specific backend instance, bypassing selection.
    pub fn with_backend(backend: Box<dyn SolverBackend>, config: SolverConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Compute post-rebalance quantities for `target_model`.
    ///
    /// Fails fast with a [`ValidationError`] on bad input and with an
    /// [`OptimizationError`] if the backend crashes. Infeasibility and the
    /// deadline are reported through [`SolverStatus`], not as errors.
    pub fn optimize_portfolio(
        &self,
        current: &CurrentHoldings,
        target_model: &InvestmentModel,
        prices: &PriceTable,
        market_value: Decimal,
        timeout: Duration,
    ) -> Result<OptimizationResult> {
        let started = Instant::now();
        let deadline = Deadline::after(timeout);
        let name = self.backend.name();

        validate_inputs(current, target_model, prices, market_value)?;

        if deadline.expired() {
            warn!("Deadline reached before solving model {}", target_model.id());
            return Ok(OptimizationResult::unsolved(
                SolverStatus::TimeLimit,
                started.elapsed(),
                name,
            ));
        }

        // Holdings outside the model: fixed quantities, not decision variables.
        let fixed: BTreeMap<SecurityId, Quantity> = current
            .iter()
            .filter(|(id, q)| **q != 0 && !target_model.contains(id))
            .map(|(&id, &q)| match self.config.unmodeled {
                UnmodeledPolicy::Liquidate => (id, 0),
                UnmodeledPolicy::Hold => (id, q),
            })
            .collect();
        let reserved = fixed.iter().try_fold(Decimal::ZERO, |sum, (id, &q)| {
            Decimal::from(q)
                .checked_mul(prices[id])
                .and_then(|value| sum.checked_add(value))
                .ok_or(ValidationError::ValueOverflow(*id))
        })?;

        let problem = Problem::formulate(
            target_model
                .positions()
                .map(|p| (p, prices[&p.security_id])),
            market_value,
            market_value - reserved,
        )?;

        let presolve = problem.presolve();
        if presolve != Presolve::Ready {
            debug!("Model {} rejected in presolve: {presolve:?}", target_model.id());
            return Ok(OptimizationResult::unsolved(
                SolverStatus::Infeasible,
                started.elapsed(),
                name,
            ));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend.solve(&problem, deadline)
        }))
        .map_err(|payload| OptimizationError::BackendCrashed {
            backend: name,
            message: panic_message(payload.as_ref()),
        })?
        .map_err(|BackendFailure(message)| OptimizationError::BackendFailed {
            backend: name,
            message,
        })?;

        let (quantities, converged) = match outcome {
            BackendOutcome::TimeLimit => {
                warn!("Deadline reached before a feasible point for model {}", target_model.id());
                return Ok(OptimizationResult::unsolved(
                    SolverStatus::TimeLimit,
                    started.elapsed(),
                    name,
                ));
            }
            BackendOutcome::Infeasible => {
                return Ok(OptimizationResult::unsolved(
                    SolverStatus::Infeasible,
                    started.elapsed(),
                    name,
                ));
            }
            BackendOutcome::Solved {
                solution,
                converged,
            } => {
                if solution.len() != problem.len() {
                    return Err(OptimizationError::BackendFailed {
                        backend: name,
                        message: format!(
                            "returned {} values for {} variables",
                            solution.len(),
                            problem.len()
                        ),
                    }
                    .into());
                }
                match solution {
                    Solution::Integer(quantities) => (quantities, converged),
                    Solution::Continuous(x) => match integer::round_and_repair(&problem, &x, deadline) {
                        Integerized::Feasible {
                            quantities,
                            converged: settled,
                        } => (quantities, converged && settled),
                        Integerized::Expired => {
                            warn!("Deadline reached while rounding model {}", target_model.id());
                            return Ok(OptimizationResult::unsolved(
                                SolverStatus::TimeLimit,
                                started.elapsed(),
                                name,
                            ));
                        }
                        Integerized::Stuck => {
                            warn!("No integer repair for model {}", target_model.id());
                            return Ok(OptimizationResult::unsolved(
                                SolverStatus::InfeasibleInaccurate,
                                started.elapsed(),
                                name,
                            ));
                        }
                    },
                }
            }
        };

        let mut optimal: BTreeMap<SecurityId, Quantity> = problem
            .variables
            .iter()
            .zip(quantities)
            .map(|(v, q)| (v.security_id, q))
            .collect();
        optimal.extend(fixed);

        let broken = violations(&optimal, target_model, prices, market_value);
        if !broken.is_empty() {
            for v in &broken {
                warn!("Rejected solution for model {}: {v}", target_model.id());
            }
            return Ok(OptimizationResult::unsolved(
                SolverStatus::InfeasibleInaccurate,
                started.elapsed(),
                name,
            ));
        }

        let objective = objective_value(&optimal, target_model, prices, market_value);
        let status = if converged {
            SolverStatus::Optimal
        } else {
            SolverStatus::OptimalInaccurate
        };
        let elapsed = started.elapsed();
        debug!(
            "Solved model {} with {name}: {status}, objective {objective}, {:.3}ms",
            target_model.id(),
            elapsed.as_secs_f64() * 1000.0
        );

        Ok(OptimizationResult::feasible(optimal, objective, status, elapsed, name))
    }

    /// Check a candidate solution without solving. See [`validate_solution`].
    pub fn validate_solution(
        &self,
        solution: &BTreeMap<SecurityId, Quantity>,
        target_model: &InvestmentModel,
        prices: &PriceTable,
        market_value: Decimal,
    ) -> bool {
        validate_solution(solution, target_model, prices, market_value)
    }

    /// Solve a trivial one-security problem. Never errors: any failure or
    /// wrong answer yields `false`.
    pub fn check_solver_health(&self) -> bool {
        match self.solve_health_check() {
            Ok(true) => true,
            Ok(false) => {
                warn!("Solver backend {} returned a wrong health-check answer", self.backend.name());
                false
            }
            Err(e) => {
                warn!("Solver backend {} failed health check: {e}", self.backend.name());
                false
            }
        }
    }

    fn solve_health_check(&self) -> Result<bool> {
        let id = SecurityId::new(HEALTH_SECURITY)?;
        let mut model = InvestmentModel::new("health", "solver health check")?;
        model.add_position(Position::new(
            id,
            TargetPercentage::new(dec!(0.5))?,
            DriftBounds::symmetric(dec!(0.1))?,
        ))?;
        let prices = BTreeMap::from([(id, dec!(10))]);

        let result = self.optimize_portfolio(
            &BTreeMap::new(),
            &model,
            &prices,
            dec!(1000),
            HEALTH_TIMEOUT,
        )?;
        Ok(result.is_feasible && result.optimal_quantities.get(&id) == Some(&50))
    }

    pub fn get_solver_info(&self) -> SolverInfo {
        SolverInfo {
            backend: self.backend.name(),
            version: self.backend.version(),
            available: backend::available_names(),
        }
    }

    /// Solve independent problems in parallel. Results keep input order.
    #[cfg(feature = "parallel")]
    pub fn optimize_batch(&self, requests: &[OptimizationRequest]) -> Vec<Result<OptimizationResult>> {
        use rayon::prelude::*;

        requests
            .par_iter()
            .map(|r| {
                self.optimize_portfolio(&r.current, &r.model, &r.prices, r.market_value, r.timeout)
            })
            .collect()
    }
}

/// Up-front input checks, in order: market value, then each holding's price
/// and quantity, then each modeled position's price.
fn validate_inputs(
    current: &CurrentHoldings,
    model: &InvestmentModel,
    prices: &PriceTable,
    market_value: Decimal,
) -> std::result::Result<(), ValidationError> {
    if market_value <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveMarketValue(market_value));
    }

    let check_price = |id: &SecurityId| match prices.get(id) {
        None => Err(ValidationError::MissingPrice(*id)),
        Some(&price) if price <= Decimal::ZERO => Err(ValidationError::NonPositivePrice {
            security: *id,
            price,
        }),
        Some(_) => Ok(()),
    };

    for (id, &quantity) in current {
        check_price(id)?;
        if quantity < 0 {
            return Err(ValidationError::NegativeQuantity {
                security: *id,
                quantity,
            });
        }
    }
    for position in model.positions() {
        check_price(&position.security_id)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
