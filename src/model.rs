//! Investment model aggregate: positions, attached portfolios, version.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{BusinessRuleViolation, Result, ValidationError};
use crate::target::{DriftBounds, MAX_TARGET, TargetPercentage};
use crate::types::SecurityId;

/// Most positions with a nonzero target a single model may carry.
pub const MAX_NONZERO_POSITIONS: usize = 100;

/// One security's target allocation and tolerance within a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub security_id: SecurityId,
    pub target: TargetPercentage,
    pub drift: DriftBounds,
}

impl Position {
    pub fn new(security_id: SecurityId, target: TargetPercentage, drift: DriftBounds) -> Self {
        Self {
            security_id,
            target,
            drift,
        }
    }
}

/// A named target allocation shared by one or more portfolios.
///
/// Invariants, re-checked after every mutation:
/// - the name is not blank,
/// - targets sum to at most [`MAX_TARGET`],
/// - at most [`MAX_NONZERO_POSITIONS`] positions carry a nonzero target,
/// - no position with a zero target is stored.
///
/// Mutations are applied to a candidate copy and only committed if the
/// invariants hold, so a failed call leaves the model untouched. Bumping
/// `version` and persisting are left to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "ModelRecord", try_from = "ModelRecord")
)]
pub struct InvestmentModel {
    id: String,
    name: String,
    positions: BTreeMap<SecurityId, Position>,
    portfolio_ids: BTreeSet<String>,
    version: u64,
    last_rebalance_date: Option<NaiveDate>,
}

impl InvestmentModel {
    /// Create an empty model at version 0.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let model = Self {
            id: id.into(),
            name: name.into(),
            positions: BTreeMap::new(),
            portfolio_ids: BTreeSet::new(),
            version: 0,
            last_rebalance_date: None,
        };
        model.validate_all_business_rules()?;
        Ok(model)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_rebalance_date(&self) -> Option<NaiveDate> {
        self.last_rebalance_date
    }

    /// Positions ordered by security id.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, security_id: &SecurityId) -> Option<&Position> {
        self.positions.get(security_id)
    }

    pub fn contains(&self, security_id: &SecurityId) -> bool {
        self.positions.contains_key(security_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn portfolio_ids(&self) -> impl Iterator<Item = &str> {
        self.portfolio_ids.iter().map(String::as_str)
    }

    pub fn target_sum(&self) -> Decimal {
        self.positions.values().map(|p| p.target.value()).sum()
    }

    pub fn nonzero_target_count(&self) -> usize {
        self.positions
            .values()
            .filter(|p| !p.target.is_zero())
            .count()
    }

    /// Add a new position. A zero-target position is silently dropped.
    pub fn add_position(&mut self, position: Position) -> Result<()> {
        if self.positions.contains_key(&position.security_id) {
            return Err(BusinessRuleViolation::DuplicatePosition(position.security_id).into());
        }
        if position.target.is_zero() {
            return Ok(());
        }

        let sum = self.target_sum() + position.target.value();
        if sum > MAX_TARGET {
            return Err(BusinessRuleViolation::TargetSumExceeded {
                sum,
                limit: MAX_TARGET,
            }
            .into());
        }
        if self.nonzero_target_count() >= MAX_NONZERO_POSITIONS {
            return Err(BusinessRuleViolation::TooManyPositions {
                limit: MAX_NONZERO_POSITIONS,
            }
            .into());
        }

        let mut candidate = self.clone();
        candidate.positions.insert(position.security_id, position);
        self.commit(candidate)
    }

    /// Replace an existing position. Updating to a zero target removes it.
    pub fn update_position(&mut self, position: Position) -> Result<()> {
        let Some(old) = self.positions.get(&position.security_id) else {
            return Err(ValidationError::PositionNotFound(position.security_id).into());
        };
        if position.target.is_zero() {
            return self.remove_position(&position.security_id);
        }

        let sum = self.target_sum() - old.target.value() + position.target.value();
        if sum > MAX_TARGET {
            return Err(BusinessRuleViolation::TargetSumExceeded {
                sum,
                limit: MAX_TARGET,
            }
            .into());
        }

        let mut candidate = self.clone();
        candidate.positions.insert(position.security_id, position);
        self.commit(candidate)
    }

    pub fn remove_position(&mut self, security_id: &SecurityId) -> Result<()> {
        if !self.positions.contains_key(security_id) {
            return Err(ValidationError::PositionNotFound(*security_id).into());
        }
        let mut candidate = self.clone();
        candidate.positions.remove(security_id);
        self.commit(candidate)
    }

    pub fn add_portfolio(&mut self, portfolio_id: impl Into<String>) -> Result<()> {
        let portfolio_id = portfolio_id.into();
        if self.portfolio_ids.contains(&portfolio_id) {
            return Err(BusinessRuleViolation::DuplicatePortfolio(portfolio_id).into());
        }
        let mut candidate = self.clone();
        candidate.portfolio_ids.insert(portfolio_id);
        self.commit(candidate)
    }

    pub fn remove_portfolio(&mut self, portfolio_id: &str) -> Result<()> {
        if !self.portfolio_ids.contains(portfolio_id) {
            return Err(ValidationError::PortfolioNotFound(portfolio_id.to_string()).into());
        }
        let mut candidate = self.clone();
        candidate.portfolio_ids.remove(portfolio_id);
        self.commit(candidate)
    }

    /// Check every model invariant.
    pub fn validate_all_business_rules(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyModelName.into());
        }

        let sum = self.target_sum();
        if sum > MAX_TARGET {
            return Err(BusinessRuleViolation::TargetSumExceeded {
                sum,
                limit: MAX_TARGET,
            }
            .into());
        }

        if self.nonzero_target_count() > MAX_NONZERO_POSITIONS {
            return Err(BusinessRuleViolation::TooManyPositions {
                limit: MAX_NONZERO_POSITIONS,
            }
            .into());
        }

        // Zero targets are never stored.
        if let Some(p) = self.positions.values().find(|p| p.target.is_zero()) {
            return Err(ValidationError::TargetOutOfRange(p.target.value()).into());
        }

        Ok(())
    }

    /// Bump the optimistic-lock version. Returns the new version.
    pub fn increment_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Reject a write prepared against a stale copy of the model.
    pub fn check_version(&self, expected: u64) -> Result<()> {
        if self.version != expected {
            return Err(BusinessRuleViolation::VersionConflict {
                expected,
                actual: self.version,
            }
            .into());
        }
        Ok(())
    }

    pub fn mark_rebalanced(&mut self, date: NaiveDate) {
        self.last_rebalance_date = Some(date);
    }

    fn commit(&mut self, candidate: Self) -> Result<()> {
        candidate.validate_all_business_rules()?;
        *self = candidate;
        Ok(())
    }
}

/// Flat serialized form of an [`InvestmentModel`]. Deserialization replays
/// every position and portfolio through the checked mutators.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelRecord {
    id: String,
    name: String,
    #[serde(default)]
    positions: Vec<Position>,
    #[serde(default)]
    portfolio_ids: Vec<String>,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    last_rebalance_date: Option<NaiveDate>,
}

#[cfg(feature = "serde")]
impl From<InvestmentModel> for ModelRecord {
    fn from(model: InvestmentModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            positions: model.positions.into_values().collect(),
            portfolio_ids: model.portfolio_ids.into_iter().collect(),
            version: model.version,
            last_rebalance_date: model.last_rebalance_date,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<ModelRecord> for InvestmentModel {
    type Error = crate::error::Error;

    fn try_from(record: ModelRecord) -> Result<Self> {
        let mut model = InvestmentModel::new(record.id, record.name)?;
        for position in record.positions {
            model.add_position(position)?;
        }
        for portfolio_id in record.portfolio_ids {
            model.add_portfolio(portfolio_id)?;
        }
        model.version = record.version;
        model.last_rebalance_date = record.last_rebalance_date;
        Ok(model)
    }
}
