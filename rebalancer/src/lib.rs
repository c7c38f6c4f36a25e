//! driftwise-rebalancer: command-line rebalancing planner.
//!
//! Reads a rebalance request (model, holdings, prices, market value) from a
//! JSON file, runs the driftwise optimizer, prints the trades and drift
//! report, writes the plan next to the request, and keeps an audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod plan;
pub mod request;
