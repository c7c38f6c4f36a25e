//! Plan computation: optimize a request and derive its trades.
//!
//! Pure with respect to the filesystem and terminal; the orchestrator in
//! [`crate::execution`] handles prompting, printing, and persistence.

use std::path::{Path, PathBuf};

use driftwise::{OptimizationEngine, OptimizationResult, RebalanceRecord, SolverStatus};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::request::RebalanceRequest;

/// A computed rebalance plan, written as `<request>.plan.json`.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub backend: &'static str,
    pub solver_status: SolverStatus,
    pub objective_value: Option<Decimal>,
    pub solve_time_seconds: f64,
    pub market_value: Decimal,
    pub record: RebalanceRecord,
}

impl Plan {
    /// True when the solver found a verified solution.
    pub fn is_feasible(&self) -> bool {
        self.solver_status.is_feasible()
    }

    fn new(request: &RebalanceRequest, result: &OptimizationResult) -> Self {
        let record = RebalanceRecord::from_optimization_result(
            &request.holdings,
            &result.optimal_quantities,
            &request.prices,
            &request.model,
            request.market_value,
            request.trade_date(),
        );
        Self {
            backend: result.backend,
            solver_status: result.solver_status,
            objective_value: result.objective_value,
            solve_time_seconds: result.solve_time_seconds,
            market_value: request.market_value,
            record,
        }
    }
}

/// Optimize `request` with the configured engine and derive the plan.
///
/// An infeasible or timed-out solve still yields a plan (a full liquidation);
/// callers decide whether to act on it.
pub fn compute(config: &Config, request: &RebalanceRequest) -> Result<Plan> {
    let engine = OptimizationEngine::new(config.solver_config())?;
    debug!("Planning model {} with {}", request.model.id(), engine.backend_name());

    let result = engine.optimize_portfolio(
        &request.holdings,
        &request.model,
        &request.prices,
        request.market_value,
        config.timeout(),
    )?;
    info!(
        "Solver {} finished: {} in {:.3}s",
        result.backend, result.solver_status, result.solve_time_seconds
    );

    Ok(Plan::new(request, &result))
}

/// Where the plan for `request_file` is written.
pub fn plan_path(request_file: &Path) -> PathBuf {
    let mut name = request_file
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "request".into());
    name.push(".plan.json");
    request_file.with_file_name(name)
}

/// Serialize `plan` as pretty JSON to `path`.
pub fn write(plan: &Plan, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(plan)?;
    std::fs::write(path, json).map_err(|e| Error::PlanWrite {
        path: path.to_path_buf(),
        source: e,
    })
}
