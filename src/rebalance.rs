//! Post-solve derivation: transactions and drift analysis.
//!
//! Everything here is infallible. Missing optimal data degrades to a full
//! liquidation and missing prices to a zero allocation, so a rebalance that
//! reaches this stage always produces a record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::model::{InvestmentModel, Position};
use crate::types::{CurrentHoldings, PriceTable, Quantity, SecurityId};

/// Decimal places kept on allocation percentages.
pub const ALLOCATION_DP: u32 = 4;

/// Trade direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum TransactionType {
    Buy,
    Sell,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
        })
    }
}

/// One whole-unit trade. `quantity` is always positive.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: TransactionType,
    pub security_id: SecurityId,
    pub quantity: u64,
    pub trade_date: NaiveDate,
}

impl Transaction {
    /// Signed change in holdings: positive for buys.
    pub fn signed_quantity(&self) -> Quantity {
        let q = Quantity::try_from(self.quantity).unwrap_or(Quantity::MAX);
        match self.kind {
            TransactionType::Buy => q,
            TransactionType::Sell => -q,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<4} {:>8} {}", self.kind, self.quantity, self.security_id)
    }
}

/// Trades that move `current` to `optimal`, ordered by security id.
///
/// Ids present in only one map count as zero in the other.
pub fn generate_transactions(
    current: &BTreeMap<SecurityId, Quantity>,
    optimal: &BTreeMap<SecurityId, Quantity>,
    trade_date: NaiveDate,
) -> Vec<Transaction> {
    let ids: BTreeSet<&SecurityId> = current.keys().chain(optimal.keys()).collect();

    ids.into_iter()
        .filter_map(|id| {
            let delta = optimal.get(id).copied().unwrap_or(0) - current.get(id).copied().unwrap_or(0);
            let kind = match delta.signum() {
                1 => TransactionType::Buy,
                -1 => TransactionType::Sell,
                _ => return None,
            };
            Some(Transaction {
                kind,
                security_id: *id,
                quantity: delta.unsigned_abs(),
                trade_date,
            })
        })
        .collect()
}

/// Replay `transactions` onto `current`. Securities netting to zero are
/// dropped from the result.
pub fn apply_transactions(current: &CurrentHoldings, transactions: &[Transaction]) -> CurrentHoldings {
    let mut net: FxHashMap<SecurityId, Quantity> = FxHashMap::default();
    for t in transactions {
        *net.entry(t.security_id).or_default() += t.signed_quantity();
    }

    let mut holdings = current.clone();
    for (id, delta) in net {
        *holdings.entry(id).or_default() += delta;
    }
    holdings.retain(|_, q| *q != 0);
    holdings
}

/// Allocation analysis of one modeled position after rebalancing.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriftRecord {
    pub security_id: SecurityId,
    pub original_quantity: Quantity,
    pub adjusted_quantity: Quantity,
    pub target: Decimal,
    pub low_drift: Decimal,
    pub high_drift: Decimal,
    /// Post-rebalance allocation, 4 dp.
    pub actual: Decimal,
    /// `actual − target`, in allocation points.
    pub actual_drift: Decimal,
}

impl DriftRecord {
    /// Whether `actual` lies in `[target − low_drift, target + high_drift]`.
    pub fn is_within_band(&self) -> bool {
        self.actual >= self.target - self.low_drift && self.actual <= self.target + self.high_drift
    }
}

/// Drift of one position given its adjusted quantity.
///
/// A non-positive `market_value` yields an actual allocation of zero; an
/// allocation beyond the decimal range saturates at `Decimal::MAX` (or `MIN`).
pub fn calculate_drift(
    position: &Position,
    original_quantity: Quantity,
    adjusted_quantity: Quantity,
    price: Decimal,
    market_value: Decimal,
) -> DriftRecord {
    let actual = if market_value > Decimal::ZERO {
        let value = Decimal::from(adjusted_quantity);
        match value
            .checked_mul(price)
            .and_then(|v| v.checked_div(market_value))
        {
            Some(a) => a.round_dp_with_strategy(ALLOCATION_DP, RoundingStrategy::MidpointNearestEven),
            None if value.is_sign_negative() != price.is_sign_negative() => Decimal::MIN,
            None => Decimal::MAX,
        }
    } else {
        Decimal::new(0, ALLOCATION_DP)
    };
    let target = position.target.value();

    DriftRecord {
        security_id: position.security_id,
        original_quantity,
        adjusted_quantity,
        target,
        low_drift: position.drift.low(),
        high_drift: position.drift.high(),
        actual,
        actual_drift: actual.saturating_sub(target),
    }
}

/// Transactions and drift report for one model rebalance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceRecord {
    pub id: Uuid,
    pub model_id: String,
    pub trade_date: NaiveDate,
    pub transactions: Vec<Transaction>,
    pub drifts: Vec<DriftRecord>,
}

impl RebalanceRecord {
    /// Derive transactions and a drift record for every modeled position.
    ///
    /// An empty `optimal` map (no solution) liquidates every current holding.
    pub fn from_optimization_result(
        current: &CurrentHoldings,
        optimal: &BTreeMap<SecurityId, Quantity>,
        prices: &PriceTable,
        model: &InvestmentModel,
        market_value: Decimal,
        trade_date: NaiveDate,
    ) -> Self {
        let liquidation: BTreeMap<SecurityId, Quantity>;
        let adjusted = if optimal.is_empty() {
            liquidation = current.keys().map(|&id| (id, 0)).collect();
            &liquidation
        } else {
            optimal
        };

        let transactions = generate_transactions(current, adjusted, trade_date);
        let drifts = model
            .positions()
            .map(|p| {
                let id = &p.security_id;
                calculate_drift(
                    p,
                    current.get(id).copied().unwrap_or(0),
                    adjusted.get(id).copied().unwrap_or(0),
                    prices.get(id).copied().unwrap_or_default(),
                    market_value,
                )
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            model_id: model.id().to_string(),
            trade_date,
            transactions,
            drifts,
        }
    }

    /// Drift records whose allocation ended up outside the band.
    pub fn out_of_band(&self) -> impl Iterator<Item = &DriftRecord> {
        self.drifts.iter().filter(|d| !d.is_within_band())
    }

    /// Largest absolute drift, zero if nothing is modeled.
    pub fn max_abs_drift(&self) -> Decimal {
        self.drifts
            .iter()
            .map(|d| d.actual_drift.abs())
            .max()
            .unwrap_or_default()
    }
}

impl fmt::Display for RebalanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "REBALANCE {} (model {}, {}):", self.id, self.model_id, self.trade_date)?;
        if self.transactions.is_empty() {
            writeln!(f, "  no trades")?;
        }
        for t in &self.transactions {
            writeln!(f, "  {t}")?;
        }
        writeln!(f, "DRIFT:")?;
        for d in &self.drifts {
            writeln!(
                f,
                "  [{}] {} {:>6} -> {:<6} target {} actual {} drift {:+}",
                if d.is_within_band() { "OK" } else { "OUT" },
                d.security_id,
                d.original_quantity,
                d.adjusted_quantity,
                d.target,
                d.actual,
                d.actual_drift,
            )?;
        }
        Ok(())
    }
}

/// Whether the current holdings warrant a rebalance: any modeled position
/// outside its band, or any nonzero holding the model does not mention.
pub fn needs_rebalance(
    current: &CurrentHoldings,
    model: &InvestmentModel,
    prices: &PriceTable,
    market_value: Decimal,
) -> bool {
    let stray = current
        .iter()
        .any(|(id, &q)| q != 0 && !model.contains(id));

    stray
        || model.positions().any(|p| {
            let id = &p.security_id;
            let held = current.get(id).copied().unwrap_or(0);
            let price = prices.get(id).copied().unwrap_or_default();
            !calculate_drift(p, held, held, price, market_value).is_within_band()
        })
}
