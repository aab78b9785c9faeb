//! Engine-wide error type.

use crate::broker::TradeError;
use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::pricing::PricingError;
use crate::symbol::{OptionType, SymbolParseError};

/// Errors surfaced by engine operations.
///
/// Broker rejections of individual orders are not errors: they become
/// terminal [`crate::orders::OrderRecord`] states so that position history
/// stays a complete audit trail.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Ticker is not part of the configured universe.
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    /// Requested expiry index is beyond the listed expiries.
    #[error("expiry index {index} out of range: {available} expiries listed")]
    ExpiryOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of expiries the feed listed.
        available: usize,
    },

    /// No listed expiry on or after the target date.
    #[error("no listed expiry for {ticker} on or after {target}")]
    NoListedExpiry {
        /// Underlying ticker.
        ticker: String,
        /// Target expiry date.
        target: chrono::NaiveDate,
    },

    /// The feed returned an empty contract list for the expiry.
    #[error("option chain for {0} is empty")]
    EmptyChain(String),

    /// No book depth available to derive a limit price from.
    #[error("no depth available for {0}")]
    NoDepth(String),

    /// A sell was requested with no filled buy at the top of the stack.
    #[error("no open {option_type} position for {ticker}")]
    NoOpenPosition {
        /// Underlying ticker.
        ticker: String,
        /// Option type of the requested position.
        option_type: OptionType,
    },

    /// Malformed option symbol.
    #[error(transparent)]
    Symbol(#[from] SymbolParseError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Pricing input outside the model's domain.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Quote feed failure, to be retried by the caller.
    #[error("quote feed: {0}")]
    Feed(#[from] FeedError),

    /// Trade service failure, to be retried by the caller.
    #[error("trade service: {0}")]
    Trade(#[from] TradeError),
}
