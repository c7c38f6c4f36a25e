//! Rebalance request (request.json) loading and validation.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use driftwise::{CurrentHoldings, InvestmentModel, PriceTable};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Everything needed to plan one rebalance: the model, what is held, what it
/// costs, and what the portfolio is worth.
///
/// Decimal fields accept JSON strings (`"95000.00"`) or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceRequest {
    pub model: InvestmentModel,
    #[serde(default)]
    pub holdings: CurrentHoldings,
    pub prices: PriceTable,
    pub market_value: Decimal,
    #[serde(default)]
    pub trade_date: Option<NaiveDate>,
}

impl RebalanceRequest {
    /// Load and validate a request.json file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::RequestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let request: RebalanceRequest = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }

    /// Catch problems the engine would reject, with friendlier messages.
    fn validate(&self) -> Result<()> {
        if self.market_value <= Decimal::ZERO {
            return Err(Error::Request(format!(
                "market_value must be positive, got {}",
                self.market_value
            )));
        }

        for (id, price) in &self.prices {
            if *price <= Decimal::ZERO {
                return Err(Error::Request(format!("price for {id} must be positive, got {price}")));
            }
        }

        for (id, qty) in &self.holdings {
            if *qty < 0 {
                return Err(Error::Request(format!("holding of {id} is negative ({qty})")));
            }
            if !self.prices.contains_key(id) {
                return Err(Error::Request(format!("no price for held security {id}")));
            }
        }

        if let Some(p) = self
            .model
            .positions()
            .find(|p| !self.prices.contains_key(&p.security_id))
        {
            return Err(Error::Request(format!(
                "no price for modeled security {}",
                p.security_id
            )));
        }

        Ok(())
    }

    /// The requested trade date, or today (UTC).
    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Current value of the holdings at the request's prices.
    pub fn holdings_value(&self) -> Decimal {
        self.holdings
            .iter()
            .filter_map(|(id, &q)| self.prices.get(id).map(|p| Decimal::from(q) * *p))
            .sum()
    }
}
