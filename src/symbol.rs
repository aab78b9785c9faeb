//! Ticker normalization and the compact option-identifier codec.
//!
//! Feed symbols are exchange-qualified (`AAPL.US`); the engine keys its maps
//! by the plain lowercase ticker. Option identifiers pack underlying, expiry,
//! type, and strike into one body before the exchange suffix:
//!
//! ```text
//! AAPL250808C230000.US
//! └┬─┘└─┬──┘│└─┬──┘ └┬┘
//! ticker │  │ strike suffix
//!     YYMMDD C|P     (thousandths: 230000 → 230.000)
//! ```

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Put option.
    Put,
    /// Call option.
    Call,
}

impl OptionType {
    /// The single-character marker used in option symbols.
    #[must_use]
    pub fn marker(self) -> char {
        match self {
            Self::Put => 'P',
            Self::Call => 'C',
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Call => write!(f, "call"),
        }
    }
}

/// Errors produced when decoding an option symbol.
///
/// Malformed symbols are always reported, never silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolParseError {
    /// No `.XX` exchange suffix.
    #[error("option symbol `{0}` is missing an exchange suffix")]
    MissingSuffix(String),
    /// No leading alphabetic ticker.
    #[error("option symbol `{0}` has no leading ticker")]
    MissingTicker(String),
    /// Body too short to hold a six-digit expiry.
    #[error("option symbol `{0}` is too short for an expiry date")]
    TruncatedExpiry(String),
    /// Expiry field is not a valid `YYMMDD` date.
    #[error("option symbol `{0}` has an invalid expiry date")]
    InvalidExpiry(String),
    /// No `P`/`C` marker after the expiry.
    #[error("option symbol `{0}` is missing the P/C type marker")]
    MissingTypeMarker(String),
    /// Strike field is empty, non-numeric, or not in thousandths.
    #[error("option symbol `{0}` has an invalid strike field")]
    InvalidStrike(String),
}

/// Formats a local ticker as an exchange-qualified feed symbol.
#[must_use]
pub fn feed_symbol(ticker: &str, market: &str) -> String {
    format!("{}.{}", ticker.to_uppercase(), market)
}

/// Strips the exchange suffix and lowercases, recovering the local ticker.
#[must_use]
pub fn local_ticker(symbol: &str) -> String {
    let body = symbol.split_once('.').map_or(symbol, |(body, _)| body);
    body.to_lowercase()
}

/// A decoded option contract identifier.
///
/// Immutable once parsed; the strike is held in exact thousandths so
/// `parse` and [`OptionSymbol::format`] round-trip without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSymbol {
    /// Lowercase local ticker of the underlying.
    pub ticker: String,
    /// Put or call.
    pub option_type: OptionType,
    /// Contract expiry date.
    pub expiry: NaiveDate,
    /// Exchange suffix, e.g. `US`.
    pub market: String,
    strike_milli: i64,
}

impl OptionSymbol {
    /// Builds a symbol from parts.
    ///
    /// # Errors
    /// Returns [`SymbolParseError::InvalidStrike`] if the strike is negative
    /// or carries more than three fractional decimal digits.
    pub fn new(
        ticker: &str,
        option_type: OptionType,
        expiry: NaiveDate,
        strike: Decimal,
        market: &str,
    ) -> Result<Self, SymbolParseError> {
        let milli = (strike * Decimal::from(1000)).normalize();
        if milli.is_sign_negative() || milli.scale() != 0 {
            return Err(SymbolParseError::InvalidStrike(strike.to_string()));
        }
        let strike_milli = i64::try_from(milli.mantissa())
            .map_err(|_| SymbolParseError::InvalidStrike(strike.to_string()))?;
        Ok(Self {
            ticker: ticker.to_lowercase(),
            option_type,
            expiry,
            market: market.to_string(),
            strike_milli,
        })
    }

    /// Decodes an exchange-qualified option symbol.
    ///
    /// # Errors
    /// Returns a [`SymbolParseError`] describing the first malformed field.
    pub fn parse(symbol: &str) -> Result<Self, SymbolParseError> {
        let err_input = || symbol.to_string();

        let (body, market) = symbol
            .split_once('.')
            .ok_or_else(|| SymbolParseError::MissingSuffix(err_input()))?;
        if market.is_empty() || !market.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SymbolParseError::MissingSuffix(err_input()));
        }

        let ticker_len = body.chars().take_while(char::is_ascii_alphabetic).count();
        if ticker_len == 0 {
            return Err(SymbolParseError::MissingTicker(err_input()));
        }
        let (ticker, rest) = body.split_at(ticker_len);

        if rest.len() < 6 {
            return Err(SymbolParseError::TruncatedExpiry(err_input()));
        }
        if !rest.as_bytes()[..6].iter().all(u8::is_ascii_digit) {
            return Err(SymbolParseError::InvalidExpiry(err_input()));
        }
        let (expiry_field, rest) = rest.split_at(6);
        let yy: i32 = expiry_field[0..2]
            .parse()
            .map_err(|_| SymbolParseError::InvalidExpiry(err_input()))?;
        let mm: u32 = expiry_field[2..4]
            .parse()
            .map_err(|_| SymbolParseError::InvalidExpiry(err_input()))?;
        let dd: u32 = expiry_field[4..6]
            .parse()
            .map_err(|_| SymbolParseError::InvalidExpiry(err_input()))?;
        let expiry = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
            .ok_or_else(|| SymbolParseError::InvalidExpiry(err_input()))?;

        let mut chars = rest.chars();
        let option_type = match chars.next() {
            Some('C') => OptionType::Call,
            Some('P') => OptionType::Put,
            _ => return Err(SymbolParseError::MissingTypeMarker(err_input())),
        };

        let strike_field = chars.as_str();
        if strike_field.is_empty()
            || strike_field.len() > 12
            || !strike_field.chars().all(|c| c.is_ascii_digit())
        {
            return Err(SymbolParseError::InvalidStrike(err_input()));
        }
        let strike_milli: i64 = strike_field
            .parse()
            .map_err(|_| SymbolParseError::InvalidStrike(err_input()))?;

        Ok(Self {
            ticker: ticker.to_lowercase(),
            option_type,
            expiry,
            market: market.to_string(),
            strike_milli,
        })
    }

    /// The strike price, exact to three fractional decimal digits.
    #[must_use]
    pub fn strike(&self) -> Decimal {
        Decimal::new(self.strike_milli, 3)
    }

    /// Re-encodes the canonical exchange-qualified symbol.
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "{}{:02}{:02}{:02}{}{}.{}",
            self.ticker.to_uppercase(),
            self.expiry.year() % 100,
            self.expiry.month(),
            self.expiry.day(),
            self.option_type.marker(),
            self.strike_milli,
            self.market,
        )
    }

    /// Human-readable contract name, e.g. `AAPL 08/08 230 Call`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let kind = match self.option_type {
            OptionType::Put => "Put",
            OptionType::Call => "Call",
        };
        format!(
            "{} {:02}/{:02} {} {}",
            self.ticker.to_uppercase(),
            self.expiry.month(),
            self.expiry.day(),
            self.strike().normalize(),
            kind,
        )
    }
}
