//! Error taxonomy.
//!
//! Three failure families, each its own type so callers can map them to
//! distinct outcomes without inspecting messages:
//!
//! - [`ValidationError`]: bad or missing input. Never retried.
//! - [`BusinessRuleViolation`]: a model mutation would break a model invariant.
//! - [`OptimizationError`]: the solver backend failed; the call is aborted.
//!
//! An infeasible or time-limited solve is *not* an error: it is reported as an
//! [`OptimizationResult`](crate::optimize::OptimizationResult) with
//! `is_feasible == false`.

use rust_decimal::Decimal;

use crate::types::{Quantity, SecurityId};

/// Bad or missing input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid security id '{0}': expected 24 alphanumeric characters")]
    InvalidSecurityId(String),

    #[error("target percentage {0} must be within [0, 0.95]")]
    TargetOutOfRange(Decimal),

    #[error("target percentage {0} must be zero or a multiple of 0.005")]
    TargetNotOnIncrement(Decimal),

    #[error("drift bound {0} must be within [0, 1]")]
    DriftOutOfRange(Decimal),

    #[error("low drift {low} exceeds high drift {high}")]
    DriftInverted { low: Decimal, high: Decimal },

    #[error("model name must not be empty")]
    EmptyModelName,

    #[error("position for {0} not found in model")]
    PositionNotFound(SecurityId),

    #[error("portfolio '{0}' not found in model")]
    PortfolioNotFound(String),

    #[error("market value {0} must be positive")]
    NonPositiveMarketValue(Decimal),

    #[error("no price for {0}")]
    MissingPrice(SecurityId),

    #[error("price {price} for {security} must be positive")]
    NonPositivePrice { security: SecurityId, price: Decimal },

    #[error("drift band for {security} at price {price} needs more than {limit} units")]
    QuantityOutOfRange {
        security: SecurityId,
        price: Decimal,
        limit: Quantity,
    },

    #[error("value of {0} holding exceeds the decimal range")]
    ValueOverflow(SecurityId),

    #[error("quantity {quantity} for {security} must not be negative")]
    NegativeQuantity {
        security: SecurityId,
        quantity: Quantity,
    },
}

/// A model mutation that would violate a model invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusinessRuleViolation {
    #[error("position for {0} already exists")]
    DuplicatePosition(SecurityId),

    #[error("target sum {sum} would exceed {limit}")]
    TargetSumExceeded { sum: Decimal, limit: Decimal },

    #[error("model already holds {limit} positions with a nonzero target")]
    TooManyPositions { limit: usize },

    #[error("portfolio '{0}' is already attached")]
    DuplicatePortfolio(String),

    #[error("version conflict: expected {expected}, stored {actual}")]
    VersionConflict { expected: u64, actual: u64 },
}

/// The solver backend failed. Fatal for the call that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimizationError {
    #[error("solver backend '{backend}' crashed: {message}")]
    BackendCrashed {
        backend: &'static str,
        message: String,
    },

    #[error("solver backend '{backend}' failed: {message}")]
    BackendFailed {
        backend: &'static str,
        message: String,
    },

    #[error("no solver backend available")]
    NoBackendAvailable,
}

/// Any error raised by this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    BusinessRule(#[from] BusinessRuleViolation),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),
}

pub type Result<T> = std::result::Result<T, Error>;
