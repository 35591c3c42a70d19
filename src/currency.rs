//! Currency conversion
//!
//! Pure conversion between the currencies items can be purchased or sold
//! in. Rates are a static USD-based table; a live rates provider can be
//! swapped in behind `convert` without touching callers.

use serde::{Deserialize, Serialize};

/// Currencies supported for purchase and sale prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "CNY")]
    Cny,
    #[serde(rename = "RUB")]
    Rub,
    #[serde(rename = "PLN")]
    Pln,
}

impl Currency {
    /// USD per one unit of this currency
    fn usd_rate(self) -> f64 {
        match self {
            Currency::Usd => 1.0,
            Currency::Eur => 1.08,
            Currency::Gbp => 1.27,
            Currency::Cny => 0.14,
            Currency::Rub => 0.011,
            Currency::Pln => 0.25,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cny => "CNY",
            Currency::Rub => "RUB",
            Currency::Pln => "PLN",
        };
        write!(f, "{}", code)
    }
}

/// Convert an amount between currencies
pub fn convert(amount: f64, from: Currency, to: Currency) -> f64 {
    if from == to {
        return amount;
    }
    amount * from.usd_rate() / to.usd_rate()
}
