//! End-to-end optimizer scenarios: solve, validate, derive.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use driftwise::optimize::{
    BACKEND_PRIORITY, BackendFailure, BackendOutcome, Deadline, Problem, SolverBackend,
};
use driftwise::{
    DriftBounds, Error, InvestmentModel, OptimizationEngine, OptimizationError, Position,
    RebalanceRecord, SecurityId, SolverConfig, SolverStatus, TargetPercentage, TransactionType,
    UnmodeledPolicy,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sid(s: &str) -> SecurityId {
    SecurityId::new(&format!("{s:0>24}")).unwrap()
}

fn position(s: &str, target: Decimal, drift: Decimal) -> Position {
    Position::new(
        sid(s),
        TargetPercentage::new(target).unwrap(),
        DriftBounds::symmetric(drift).unwrap(),
    )
}

fn engine_for(backend: &str) -> OptimizationEngine {
    OptimizationEngine::new(SolverConfig {
        preferred_backend: Some(backend.to_string()),
        ..Default::default()
    })
    .unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
}

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Reference scenario
// ============================================================================

#[test]
fn two_asset_rebalance_on_every_backend() {
    let mut model = InvestmentModel::new("ref", "Reference").unwrap();
    model.add_position(position("A", dec!(0.60), dec!(0.05))).unwrap();
    model.add_position(position("B", dec!(0.30), dec!(0.03))).unwrap();
    let current = BTreeMap::from([(sid("A"), 500), (sid("B"), 400)]);
    let prices = BTreeMap::from([(sid("A"), dec!(100)), (sid("B"), dec!(100))]);

    for backend in BACKEND_PRIORITY {
        let engine = engine_for(backend);
        let r = engine
            .optimize_portfolio(&current, &model, &prices, dec!(95000), TIMEOUT)
            .unwrap();

        assert!(r.is_feasible, "{backend}: {:?}", r.solver_status);
        assert!(engine.validate_solution(&r.optimal_quantities, &model, &prices, dec!(95000)));

        // 570 × 100 = 57 000 and 285 × 100 = 28 500 sit exactly on target.
        assert_eq!(r.optimal_quantities[&sid("A")], 570, "{backend}");
        assert_eq!(r.optimal_quantities[&sid("B")], 285, "{backend}");

        let record = RebalanceRecord::from_optimization_result(
            &current,
            &r.optimal_quantities,
            &prices,
            &model,
            dec!(95000),
            date(),
        );
        let trades: Vec<_> = record
            .transactions
            .iter()
            .map(|t| (t.kind, t.security_id, t.quantity))
            .collect();
        assert_eq!(
            trades,
            vec![
                (TransactionType::Buy, sid("A"), 70),
                (TransactionType::Sell, sid("B"), 115),
            ]
        );
        assert!(record.drifts.iter().all(|d| d.is_within_band()));
    }
}

#[test]
fn indivisible_prices_stay_in_band() {
    let mut model = InvestmentModel::new("odd", "Odd prices").unwrap();
    model.add_position(position("A", dec!(0.40), dec!(0.02))).unwrap();
    model.add_position(position("B", dec!(0.35), dec!(0.02))).unwrap();
    model.add_position(position("C", dec!(0.20), dec!(0.01))).unwrap();
    let prices = BTreeMap::from([
        (sid("A"), dec!(137.13)),
        (sid("B"), dec!(59.87)),
        (sid("C"), dec!(412.50)),
    ]);
    let mv = dec!(250000);

    for backend in BACKEND_PRIORITY {
        let engine = engine_for(backend);
        let r = engine
            .optimize_portfolio(&BTreeMap::new(), &model, &prices, mv, TIMEOUT)
            .unwrap();
        assert!(r.is_feasible, "{backend}");
        assert!(engine.validate_solution(&r.optimal_quantities, &model, &prices, mv));
        let spend: Decimal = r
            .optimal_quantities
            .iter()
            .map(|(id, &q)| Decimal::from(q) * prices[id])
            .sum();
        assert!(spend <= mv);
    }
}

#[test]
fn both_backends_agree_on_objective() {
    let mut model = InvestmentModel::new("agree", "Agreement").unwrap();
    model.add_position(position("A", dec!(0.50), dec!(0.05))).unwrap();
    model.add_position(position("B", dec!(0.25), dec!(0.05))).unwrap();
    model.add_position(position("C", dec!(0.20), dec!(0.05))).unwrap();
    let prices = BTreeMap::from([
        (sid("A"), dec!(33)),
        (sid("B"), dec!(71)),
        (sid("C"), dec!(19)),
    ]);

    let objectives: Vec<Decimal> = BACKEND_PRIORITY
        .iter()
        .map(|b| {
            engine_for(b)
                .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(10000), TIMEOUT)
                .unwrap()
                .objective_value
                .unwrap()
        })
        .collect();
    assert_eq!(objectives[0], objectives[1]);
}

// ============================================================================
// Infeasibility, deadlines, crashes
// ============================================================================

#[test]
fn narrow_band_is_infeasible_without_error() {
    let mut model = InvestmentModel::new("narrow", "Narrow").unwrap();
    model.add_position(position("X", dec!(0.95), dec!(0.001))).unwrap();
    let prices = BTreeMap::from([(sid("X"), dec!(7000))]);

    for backend in BACKEND_PRIORITY {
        let r = engine_for(backend)
            .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(100000), TIMEOUT)
            .unwrap();
        assert!(!r.is_feasible);
        assert_eq!(r.solver_status, SolverStatus::Infeasible);
        assert_eq!(r.solver_status.as_str(), "infeasible");
    }
}

#[test]
fn narrow_band_barely_feasible() {
    // Band [94 900, 95 100] contains 95 × 1000.
    let mut model = InvestmentModel::new("narrow", "Narrow").unwrap();
    model.add_position(position("X", dec!(0.95), dec!(0.001))).unwrap();
    let prices = BTreeMap::from([(sid("X"), dec!(1000))]);

    let r = engine_for("dual-bisection")
        .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(100000), TIMEOUT)
        .unwrap();
    assert!(r.is_feasible);
    assert_eq!(r.optimal_quantities[&sid("X")], 95);
}

#[test]
fn infeasible_result_derives_liquidation() {
    let mut model = InvestmentModel::new("narrow", "Narrow").unwrap();
    model.add_position(position("X", dec!(0.95), dec!(0.001))).unwrap();
    let prices = BTreeMap::from([(sid("X"), dec!(7000))]);
    let current = BTreeMap::from([(sid("X"), 13)]);

    let r = engine_for("dual-bisection")
        .optimize_portfolio(&current, &model, &prices, dec!(100000), TIMEOUT)
        .unwrap();
    assert!(!r.is_feasible);

    let record = RebalanceRecord::from_optimization_result(
        &current,
        &r.optimal_quantities,
        &prices,
        &model,
        dec!(100000),
        date(),
    );
    assert_eq!(record.transactions.len(), 1);
    assert_eq!(record.transactions[0].kind, TransactionType::Sell);
    assert_eq!(record.transactions[0].quantity, 13);
}

#[test]
fn zero_timeout_reports_time_limit() {
    let mut model = InvestmentModel::new("t", "Timeout").unwrap();
    model.add_position(position("A", dec!(0.5), dec!(0.1))).unwrap();
    let prices = BTreeMap::from([(sid("A"), dec!(10))]);

    let r = engine_for("local-search")
        .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(1000), Duration::ZERO)
        .unwrap();
    assert_eq!(r.solver_status, SolverStatus::TimeLimit);
    assert!(!r.is_feasible);
    assert!(r.objective_value.is_none());
}

struct Failing;

impl SolverBackend for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn solve(&self, _: &Problem, _: Deadline) -> Result<BackendOutcome, BackendFailure> {
        Err(BackendFailure("license server unreachable".into()))
    }
}

#[test]
fn backend_failure_is_fatal_and_unhealthy() {
    let mut model = InvestmentModel::new("f", "Failing").unwrap();
    model.add_position(position("A", dec!(0.5), dec!(0.1))).unwrap();
    let prices = BTreeMap::from([(sid("A"), dec!(10))]);
    let engine = OptimizationEngine::with_backend(Box::new(Failing), SolverConfig::default());

    let err = engine
        .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(1000), TIMEOUT)
        .unwrap_err();
    assert_eq!(
        err,
        Error::Optimization(OptimizationError::BackendFailed {
            backend: "failing",
            message: "license server unreachable".into(),
        })
    );
    assert!(!engine.check_solver_health());
    assert_eq!(engine.get_solver_info().backend, "failing");
}

// ============================================================================
// Backend selection and unmodeled holdings
// ============================================================================

#[test]
fn unknown_backend_falls_back() {
    let engine = engine_for("cplex");
    assert_eq!(engine.backend_name(), "dual-bisection");
    assert!(engine.check_solver_health());
}

#[test]
fn unmodeled_holdings_policy() {
    let mut model = InvestmentModel::new("u", "Unmodeled").unwrap();
    model.add_position(position("A", dec!(0.5), dec!(0.1))).unwrap();
    let prices = BTreeMap::from([(sid("A"), dec!(10)), (sid("Z"), dec!(5))]);
    let current = BTreeMap::from([(sid("Z"), 20)]);

    let liquidate = OptimizationEngine::new(SolverConfig::default())
        .unwrap()
        .optimize_portfolio(&current, &model, &prices, dec!(1000), TIMEOUT)
        .unwrap();
    assert_eq!(liquidate.optimal_quantities[&sid("Z")], 0);
    assert_eq!(liquidate.optimal_quantities[&sid("A")], 50);

    let hold = OptimizationEngine::new(SolverConfig {
        unmodeled: UnmodeledPolicy::Hold,
        ..Default::default()
    })
    .unwrap()
    .optimize_portfolio(&current, &model, &prices, dec!(1000), TIMEOUT)
    .unwrap();
    assert_eq!(hold.optimal_quantities[&sid("Z")], 20);
    assert_eq!(hold.optimal_quantities[&sid("A")], 50);
}

#[cfg(feature = "parallel")]
#[test]
fn batch_keeps_input_order() {
    use driftwise::OptimizationRequest;

    let requests: Vec<OptimizationRequest> = [dec!(0.2), dec!(0.5), dec!(0.8)]
        .into_iter()
        .map(|target| {
            let mut model = InvestmentModel::new("batch", "Batch").unwrap();
            model.add_position(position("A", target, dec!(0.05))).unwrap();
            OptimizationRequest {
                current: BTreeMap::new(),
                model,
                prices: BTreeMap::from([(sid("A"), dec!(10))]),
                market_value: dec!(1000),
                timeout: TIMEOUT,
            }
        })
        .collect();

    let results = engine_for("dual-bisection").optimize_batch(&requests);
    let quantities: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().optimal_quantities[&sid("A")])
        .collect();
    assert_eq!(quantities, vec![20, 50, 80]);
}
