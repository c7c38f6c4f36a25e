//! Decimal re-validation of candidate solutions.
//!
//! Every integer solution is checked here against the original decimal
//! inputs before it leaves the engine, independent of whatever f64
//! arithmetic the backend used to find it.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::model::InvestmentModel;
use crate::types::{PriceTable, Quantity, SecurityId};

/// Slack allowed on every value comparison, in currency units.
pub const VALUE_TOLERANCE: Decimal = dec!(0.000001);

/// One broken constraint in a candidate solution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    NonPositiveMarketValue(Decimal),
    NegativeQuantity {
        security: SecurityId,
        quantity: Quantity,
    },
    MissingPrice(SecurityId),
    BelowBand {
        security: SecurityId,
        value: Decimal,
        min: Decimal,
    },
    AboveBand {
        security: SecurityId,
        value: Decimal,
        max: Decimal,
    },
    CapitalExceeded {
        spend: Decimal,
        market_value: Decimal,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveMarketValue(mv) => write!(f, "market value {mv} is not positive"),
            Self::NegativeQuantity { security, quantity } => {
                write!(f, "quantity {quantity} for {security} is negative")
            }
            Self::MissingPrice(security) => write!(f, "no positive price for {security}"),
            Self::BelowBand {
                security,
                value,
                min,
            } => write!(f, "value {value} for {security} below band minimum {min}"),
            Self::AboveBand {
                security,
                value,
                max,
            } => write!(f, "value {value} for {security} above band maximum {max}"),
            Self::CapitalExceeded {
                spend,
                market_value,
            } => write!(f, "total value {spend} exceeds market value {market_value}"),
        }
    }
}

/// Every constraint `solution` breaks. Modeled securities missing from the
/// solution count as zero; unmodeled entries only count toward capital.
pub fn violations(
    solution: &BTreeMap<SecurityId, Quantity>,
    model: &InvestmentModel,
    prices: &PriceTable,
    market_value: Decimal,
) -> Vec<Violation> {
    let mut found = Vec::new();

    if market_value <= Decimal::ZERO {
        found.push(Violation::NonPositiveMarketValue(market_value));
        return found;
    }

    let price_of = |id: &SecurityId| prices.get(id).copied().filter(|p| *p > Decimal::ZERO);

    for position in model.positions() {
        let id = position.security_id;
        let quantity = solution.get(&id).copied().unwrap_or(0);
        let value = match price_of(&id) {
            Some(price) => Decimal::from(quantity).saturating_mul(price),
            None if quantity == 0 => Decimal::ZERO,
            None => {
                found.push(Violation::MissingPrice(id));
                continue;
            }
        };

        let target = position.target.value();
        let min = (target - position.drift.low()) * market_value;
        let max = (target + position.drift.high()) * market_value;
        if value < min - VALUE_TOLERANCE {
            found.push(Violation::BelowBand {
                security: id,
                value,
                min,
            });
        }
        if value > max + VALUE_TOLERANCE {
            found.push(Violation::AboveBand {
                security: id,
                value,
                max,
            });
        }
    }

    let mut spend = Decimal::ZERO;
    for (&id, &quantity) in solution {
        if quantity < 0 {
            found.push(Violation::NegativeQuantity {
                security: id,
                quantity,
            });
            continue;
        }
        if quantity == 0 {
            continue;
        }
        match price_of(&id) {
            Some(price) => spend = spend.saturating_add(Decimal::from(quantity).saturating_mul(price)),
            // Modeled ids were already reported above.
            None if !model.contains(&id) => found.push(Violation::MissingPrice(id)),
            None => {}
        }
    }
    if spend > market_value + VALUE_TOLERANCE {
        found.push(Violation::CapitalExceeded {
            spend,
            market_value,
        });
    }

    found
}

/// True iff `solution` satisfies every drift band and the capital limit.
pub fn validate_solution(
    solution: &BTreeMap<SecurityId, Quantity>,
    model: &InvestmentModel,
    prices: &PriceTable,
    market_value: Decimal,
) -> bool {
    violations(solution, model, prices, market_value).is_empty()
}

/// Objective in normalized form: `Σ (valueᵢ / MV − targetᵢ)² / targetᵢ`.
pub fn objective_value(
    solution: &BTreeMap<SecurityId, Quantity>,
    model: &InvestmentModel,
    prices: &PriceTable,
    market_value: Decimal,
) -> Decimal {
    model
        .positions()
        .map(|p| {
            let quantity = solution.get(&p.security_id).copied().unwrap_or(0);
            let price = prices.get(&p.security_id).copied().unwrap_or_default();
            let target = p.target.value();
            let deviation = Decimal::from(quantity) * price / market_value - target;
            deviation * deviation / target
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::target::{DriftBounds, TargetPercentage};

    fn sid(s: &str) -> SecurityId {
        SecurityId::new(&format!("{s:0>24}")).unwrap()
    }

    fn model() -> InvestmentModel {
        let mut m = InvestmentModel::new("m", "Two asset").unwrap();
        m.add_position(Position::new(
            sid("A"),
            TargetPercentage::new(dec!(0.6)).unwrap(),
            DriftBounds::symmetric(dec!(0.05)).unwrap(),
        ))
        .unwrap();
        m.add_position(Position::new(
            sid("B"),
            TargetPercentage::new(dec!(0.3)).unwrap(),
            DriftBounds::symmetric(dec!(0.03)).unwrap(),
        ))
        .unwrap();
        m
    }

    fn prices() -> PriceTable {
        [(sid("A"), dec!(100)), (sid("B"), dec!(100))].into()
    }

    #[test]
    fn accepts_on_target() {
        let solution: BTreeMap<SecurityId, Quantity> = [(sid("A"), 570), (sid("B"), 285)].into();
        assert!(validate_solution(&solution, &model(), &prices(), dec!(95000)));
        assert_eq!(
            objective_value(&solution, &model(), &prices(), dec!(95000)),
            Decimal::ZERO
        );
    }

    #[test]
    fn flags_band_breaches() {
        let solution: BTreeMap<SecurityId, Quantity> = [(sid("A"), 500), (sid("B"), 320)].into();
        let found = violations(&solution, &model(), &prices(), dec!(95000));
        assert_eq!(found.len(), 2);
        assert!(matches!(found[0], Violation::BelowBand { .. }));
        assert!(matches!(found[1], Violation::AboveBand { .. }));
    }

    #[test]
    fn missing_modeled_security_counts_as_zero() {
        let solution: BTreeMap<SecurityId, Quantity> = [(sid("A"), 570)].into();
        let found = violations(&solution, &model(), &prices(), dec!(95000));
        assert_eq!(
            found,
            vec![Violation::BelowBand {
                security: sid("B"),
                value: Decimal::ZERO,
                min: dec!(25650),
            }]
        );
    }

    #[test]
    fn flags_capital_excess_from_unmodeled() {
        let mut prices = prices();
        prices.insert(sid("C"), dec!(50));
        let solution: BTreeMap<SecurityId, Quantity> = [(sid("A"), 570), (sid("B"), 285), (sid("C"), 200)].into();
        let found = violations(&solution, &model(), &prices, dec!(95000));
        assert!(matches!(found[..], [Violation::CapitalExceeded { .. }]));
    }

    #[test]
    fn flags_negative_and_unpriced() {
        let solution: BTreeMap<SecurityId, Quantity> = [(sid("A"), 570), (sid("B"), 285), (sid("C"), -1), (sid("D"), 3)].into();
        let found = violations(&solution, &model(), &prices(), dec!(95000));
        assert!(found.contains(&Violation::NegativeQuantity {
            security: sid("C"),
            quantity: -1
        }));
        assert!(found.contains(&Violation::MissingPrice(sid("D"))));
    }

    #[test]
    fn rejects_non_positive_market_value() {
        let solution = BTreeMap::new();
        assert!(!validate_solution(&solution, &model(), &prices(), Decimal::ZERO));
    }

    #[test]
    fn display() {
        let v = Violation::CapitalExceeded {
            spend: dec!(101),
            market_value: dec!(100),
        };
        assert_eq!(v.to_string(), "total value 101 exceeds market value 100");
    }
}
