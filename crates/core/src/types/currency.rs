//! ISO 4217 currency codes for the supported gateway markets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A currency code the gateways can settle in.
///
/// Verification compares the gateway-reported currency against the ledger
/// currency exactly; an unknown code from a gateway response is a parse
/// error, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    NGN,
    USD,
    GHS,
    KES,
    ZAR,
}

/// A currency string that does not name a supported currency.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported currency: {0}")]
pub struct CurrencyParseError(pub String);

impl CurrencyCode {
    /// The ISO 4217 code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NGN => "NGN",
            Self::USD => "USD",
            Self::GHS => "GHS",
            Self::KES => "KES",
            Self::ZAR => "ZAR",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NGN" => Ok(Self::NGN),
            "USD" => Ok(Self::USD),
            "GHS" => Ok(Self::GHS),
            "KES" => Ok(Self::KES),
            "ZAR" => Ok(Self::ZAR),
            _ => Err(CurrencyParseError(s.to_owned())),
        }
    }
}
