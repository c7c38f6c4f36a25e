//! # driftwise
//!
//! Model-portfolio rebalancing: integer trades that move holdings back inside
//! per-security drift bands without spending more than the portfolio is worth.
//!
//! ## Features
//!
//! - **Validated value objects**: target allocations on a 0.5% grid, drift bands
//! - **Investment models**: positions with aggregate invariants checked on every mutation
//! - **Integer optimizer**: convex objective centred on targets, capital constraint,
//!   cooperative deadline, pluggable backends with deterministic fallback
//! - **Verified output**: every solution is re-checked in decimal arithmetic
//! - **Derivation**: BUY/SELL transactions and a per-position drift report
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! use chrono::NaiveDate;
//! use driftwise::{
//!     DriftBounds, InvestmentModel, OptimizationEngine, Position, RebalanceRecord, SecurityId,
//!     SolverConfig, TargetPercentage, TransactionType,
//! };
//! use rust_decimal_macros::dec;
//!
//! let equity = SecurityId::new("EQUITY000000000000000001").unwrap();
//! let bonds = SecurityId::new("BONDS0000000000000000001").unwrap();
//!
//! let mut model = InvestmentModel::new("balanced", "Balanced 60/30").unwrap();
//! model.add_position(Position::new(
//!     equity,
//!     TargetPercentage::new(dec!(0.60)).unwrap(),
//!     DriftBounds::symmetric(dec!(0.05)).unwrap(),
//! )).unwrap();
//! model.add_position(Position::new(
//!     bonds,
//!     TargetPercentage::new(dec!(0.30)).unwrap(),
//!     DriftBounds::symmetric(dec!(0.03)).unwrap(),
//! )).unwrap();
//!
//! let current = BTreeMap::from([(equity, 500), (bonds, 400)]);
//! let prices = BTreeMap::from([(equity, dec!(100)), (bonds, dec!(100))]);
//! let market_value = dec!(95000);
//!
//! let engine = OptimizationEngine::new(SolverConfig::default()).unwrap();
//! let result = engine
//!     .optimize_portfolio(&current, &model, &prices, market_value, Duration::from_secs(5))
//!     .unwrap();
//! assert!(result.is_feasible);
//! assert_eq!(result.optimal_quantities[&equity], 570);
//! assert_eq!(result.optimal_quantities[&bonds], 285);
//!
//! let trade_date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
//! let record = RebalanceRecord::from_optimization_result(
//!     &current,
//!     &result.optimal_quantities,
//!     &prices,
//!     &model,
//!     market_value,
//!     trade_date,
//! );
//! assert_eq!(record.transactions.len(), 2);
//! assert_eq!(record.transactions[0].kind, TransactionType::Sell); // BONDS… sorts first
//! assert_eq!(record.transactions[0].quantity, 115);
//! assert!(record.out_of_band().next().is_none());
//! ```
//!
//! ## Infeasible and Timed-Out Solves
//!
//! Neither is an error: the result says why no quantities came back.
//!
//! ```
//! # use std::collections::BTreeMap;
//! # use std::time::Duration;
//! # use driftwise::{DriftBounds, InvestmentModel, OptimizationEngine, Position, SecurityId,
//! #     SolverConfig, SolverStatus, TargetPercentage};
//! # use rust_decimal_macros::dec;
//! let id = SecurityId::new("NARROW000000000000000001").unwrap();
//! let mut model = InvestmentModel::new("narrow", "Narrow band").unwrap();
//! model.add_position(Position::new(
//!     id,
//!     TargetPercentage::new(dec!(0.95)).unwrap(),
//!     DriftBounds::symmetric(dec!(0.001)).unwrap(),
//! )).unwrap();
//!
//! let engine = OptimizationEngine::new(SolverConfig::default()).unwrap();
//! let prices = BTreeMap::from([(id, dec!(7000))]);
//!
//! let r = engine
//!     .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(100000), Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(r.solver_status, SolverStatus::Infeasible);
//! assert!(!r.is_feasible);
//!
//! let r = engine
//!     .optimize_portfolio(&BTreeMap::new(), &model, &prices, dec!(100000), Duration::ZERO)
//!     .unwrap();
//! assert_eq!(r.solver_status, SolverStatus::TimeLimit);
//! ```
//!
//! ## Allocation Grid
//!
//! | Bound | Value |
//! |-------|-------|
//! | **Target step** | 0.005 |
//! | **Max target / target sum** | 0.95 |
//! | **Max nonzero positions** | 100 |
//! | **Drift bounds** | `0 ≤ low ≤ high ≤ 1` |

mod error;
pub mod model;
pub mod optimize;
pub mod rebalance;
mod target;
mod types;

// Re-export public API
pub use error::{BusinessRuleViolation, Error, OptimizationError, Result, ValidationError};
pub use model::{InvestmentModel, MAX_NONZERO_POSITIONS, Position};
pub use optimize::{
    OptimizationEngine, OptimizationRequest, OptimizationResult, SolverConfig, SolverInfo,
    SolverStatus, UnmodeledPolicy,
};
pub use rebalance::{
    DriftRecord, RebalanceRecord, Transaction, TransactionType, apply_transactions,
    calculate_drift, generate_transactions, needs_rebalance,
};
pub use target::{DriftBounds, MAX_TARGET, TARGET_INCREMENT, TargetPercentage};
pub use types::{CurrentHoldings, PriceTable, Quantity, SECURITY_ID_LEN, SecurityId};
