//! Execution orchestrator: load → optimize → derive → confirm → write.
//!
//! This is the main workflow that ties together all components.

use std::path::PathBuf;

use driftwise::{OptimizationEngine, SecurityId, needs_rebalance};
use log::{info, warn};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::plan::{self, Plan};
use crate::request::RebalanceRequest;

/// Options for a planning run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub request_file: PathBuf,
}

/// Plan a rebalance and, unless dry-running, write the plan file.
///
/// Returns the path written, if any. An infeasible plan is audited and
/// printed, then reported as [`Error::Infeasible`].
pub fn run(config: &Config, request: &RebalanceRequest, opts: &RunOptions) -> Result<Option<PathBuf>> {
    // 1. Open audit log
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(
        &mut audit,
        &opts.request_file.display().to_string(),
        request.model.id(),
    )?;

    display_current_holdings(request);

    // 2. Optimize and derive
    let plan = plan::compute(config, request)?;
    audit::log_optimization(&mut audit, &plan)?;
    audit::log_transactions(&mut audit, &plan)?;
    audit::log_drift(&mut audit, &plan)?;

    // 3. Display the plan
    display_plan(&plan);

    if !plan.is_feasible() {
        audit::log_run_completed(&mut audit, None)?;
        return Err(Error::Infeasible(format!(
            "solver returned {} for model {}",
            plan.solver_status,
            request.model.id()
        )));
    }

    if plan.record.transactions.is_empty() {
        println!("\nNo rebalancing needed: holdings already match the optimal allocation.");
        audit.log_simple("no_rebalance_needed")?;
    }

    // 4. Dry run stops here
    if opts.dry_run {
        println!("\n[DRY RUN] No plan written.");
        audit::log_run_completed(&mut audit, None)?;
        return Ok(None);
    }

    // 5. Confirm
    if !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Write plan?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        if !confirmed {
            println!("Aborted.");
            audit.log("user_confirmed", serde_json::json!({"approved": false}))?;
            return Ok(None);
        }

        audit.log("user_confirmed", serde_json::json!({"approved": true}))?;
    }

    // 6. Write
    let path = plan::plan_path(&opts.request_file);
    plan::write(&plan, &path)?;
    audit::log_run_completed(&mut audit, Some(&path))?;
    println!(
        "\nPlan {} written to {}. Audit logged to {}",
        plan.record.id,
        path.display(),
        config.audit_path().display()
    );

    Ok(Some(path))
}

/// Print the selected backend and whether it passes a trivial solve.
pub fn solver_status(config: &Config) -> Result<bool> {
    let engine = OptimizationEngine::new(config.solver_config())?;
    let info = engine.get_solver_info();
    println!("Solver: {info}");

    print!("Health check... ");
    let healthy = engine.check_solver_health();
    println!("{}", if healthy { "OK" } else { "FAILED" });
    if !healthy {
        warn!("Solver backend {} failed its health check", info.backend);
    }
    Ok(healthy)
}

/// Report whether the current holdings sit outside the model's bands.
pub fn check(request: &RebalanceRequest) -> Result<bool> {
    display_current_holdings(request);

    let needed = needs_rebalance(
        &request.holdings,
        &request.model,
        &request.prices,
        request.market_value,
    );
    if needed {
        println!("\nRebalance needed.");
    } else {
        println!("\nAll positions within drift bands.");
    }
    info!("Check for model {}: rebalance needed = {needed}", request.model.id());
    Ok(needed)
}

// === Helpers ===

/// Current allocation per held security, as a fraction of market value.
pub fn current_weights(request: &RebalanceRequest) -> FxHashMap<SecurityId, Decimal> {
    request
        .holdings
        .iter()
        .filter_map(|(id, &q)| {
            let price = request.prices.get(id)?;
            let weight = if request.market_value > Decimal::ZERO {
                Decimal::from(q) * *price / request.market_value
            } else {
                Decimal::ZERO
            };
            Some((*id, weight))
        })
        .collect()
}

fn display_current_holdings(request: &RebalanceRequest) {
    println!(
        "Model {} v{} ({}): market value {}",
        request.model.id(),
        request.model.version(),
        request.model.name(),
        request.market_value,
    );

    if request.holdings.is_empty() {
        println!("No holdings.");
        return;
    }

    let weights = current_weights(request);
    println!("CURRENT HOLDINGS:");
    for (id, qty) in &request.holdings {
        let target = request
            .model
            .position(id)
            .map(|p| p.target.to_string())
            .unwrap_or_else(|| "-".into());
        let weight = weights.get(id).copied().unwrap_or_default();
        println!(
            "  {} {:>8}  ({:.2}% now, target {})",
            id,
            qty,
            weight * Decimal::ONE_HUNDRED,
            target,
        );
    }
}

fn display_plan(plan: &Plan) {
    println!(
        "\nSOLVER: {} -> {} in {:.3}s (objective {})",
        plan.backend,
        plan.solver_status,
        plan.solve_time_seconds,
        plan.objective_value
            .map(|v| v.round_dp(8).to_string())
            .unwrap_or_else(|| "n/a".into()),
    );
    println!();
    print!("{}", plan.record);

    let out: Vec<_> = plan.record.out_of_band().collect();
    if !out.is_empty() {
        println!("\n{} position(s) outside drift bands after rebalance.", out.len());
    }
}
