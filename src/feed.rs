//! Quote-feed boundary: the interface to the external market-data venue.
//!
//! The engine never talks to a venue directly. Pull-style point queries go
//! through [`QuoteFeed`]; push delivery is inverted, with the transport
//! handing [`QuotePush`] events to [`crate::engine::Engine::handle_quote`]
//! and [`crate::chain::ChainView::apply`]. Subscription calls are expected
//! to be idempotent on the venue side; the engine additionally reference
//! counts them in [`crate::subscription::SubscriptionRegistry`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quote feed failure, surfaced to the caller for retry.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// The venue does not know the symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// Transient connectivity or rate-limit fault.
    #[error("quote feed unavailable: {0}")]
    Unavailable(String),
}

/// Kinds of push subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubKind {
    /// Last trade price/volume pushes.
    Quote,
    /// Best bid/ask pushes.
    Depth,
}

/// One push update of last trade price/volume/high/low for an instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotePush {
    /// Exchange-qualified symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_done: Decimal,
    /// Cumulative session volume.
    pub volume: u64,
    /// Session high.
    pub day_high: Decimal,
    /// Session low.
    pub day_low: Decimal,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

/// One price level of the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting quantity.
    pub quantity: u64,
}

/// Point-in-time book depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Exchange-qualified symbol.
    pub symbol: String,
    /// Bid levels, best first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    /// Best bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

/// Pre-market session quote carried inside a [`QuoteSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreMarketQuote {
    /// Last pre-market trade.
    pub last_done: Decimal,
    /// Previous session close.
    pub prev_close: Decimal,
}

/// Point-in-time quote for an underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Exchange-qualified symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_done: Decimal,
    /// Previous session close.
    pub prev_close: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Cumulative session volume.
    pub volume: u64,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
    /// Pre-market quote, when the venue reports one.
    pub pre_market: Option<PreMarketQuote>,
}

/// Point-in-time quote for an option contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuoteSnapshot {
    /// Exchange-qualified option symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_done: Decimal,
    /// Previous session close.
    pub prev_close: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Cumulative session volume.
    pub volume: u64,
    /// Open interest.
    pub open_interest: u64,
    /// Implied volatility, as a fraction.
    pub implied_volatility: Decimal,
    /// Historical volatility, as a fraction.
    pub historical_volatility: Decimal,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
}

/// One strike row of a chain-by-expiry response, strike-ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeRow {
    /// Strike price.
    pub strike: Decimal,
    /// Call contract symbol at this strike.
    pub call_symbol: String,
    /// Put contract symbol at this strike.
    pub put_symbol: String,
}

/// One daily candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleBar {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Bar volume.
    pub volume: u64,
    /// Bar timestamp.
    pub timestamp: DateTime<Utc>,
}

/// One point of the intraday average-price series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntradayPoint {
    /// Volume-weighted average price so far.
    pub avg_price: Decimal,
    /// Point timestamp.
    pub timestamp: DateTime<Utc>,
}

/// One line of the capital-flow series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalFlowLine {
    /// Net inflow over the interval.
    pub inflow: Decimal,
    /// Interval timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Capital in/out split by order size class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalDistribution {
    /// Large-order inflow.
    pub large_in: Decimal,
    /// Large-order outflow.
    pub large_out: Decimal,
    /// Medium-order inflow.
    pub medium_in: Decimal,
    /// Medium-order outflow.
    pub medium_out: Decimal,
    /// Small-order inflow.
    pub small_in: Decimal,
    /// Small-order outflow.
    pub small_out: Decimal,
}

/// Trading-session check, provided by the host process.
///
/// The holiday/session logic itself (calendar, timezone) lives outside the
/// engine; components only ask whether the market is open right now.
pub trait TradingCalendar: Send + Sync {
    /// Whether the market is currently in a regular trading session.
    fn is_market_open(&self) -> bool;
}

/// Pull-style market data interface.
#[allow(async_fn_in_trait)]
pub trait QuoteFeed: Send + Sync {
    /// Current quotes for the given symbols.
    async fn quote(&self, symbols: &[String]) -> Result<Vec<QuoteSnapshot>, FeedError>;

    /// Current quotes for the given option symbols.
    async fn option_quote(
        &self,
        symbols: &[String],
    ) -> Result<Vec<OptionQuoteSnapshot>, FeedError>;

    /// Current book depth for one symbol.
    async fn depth(&self, symbol: &str) -> Result<DepthSnapshot, FeedError>;

    /// Listed option expiry dates for an underlying, ascending.
    async fn expiry_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>, FeedError>;

    /// Strike rows for one expiry of an underlying, strike-ascending.
    async fn chain_by_date(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<Vec<StrikeRow>, FeedError>;

    /// Intraday average-price series for an underlying.
    async fn intraday(&self, symbol: &str) -> Result<Vec<IntradayPoint>, FeedError>;

    /// Capital-flow series for an underlying.
    async fn capital_flow(&self, symbol: &str) -> Result<Vec<CapitalFlowLine>, FeedError>;

    /// Capital distribution by order size class.
    async fn capital_distribution(&self, symbol: &str)
    -> Result<CapitalDistribution, FeedError>;

    /// Most recent daily candles, oldest first.
    async fn candlesticks(&self, symbol: &str, count: usize) -> Result<Vec<CandleBar>, FeedError>;

    /// Starts push delivery for the symbols and kinds.
    async fn subscribe(&self, symbols: &[String], kinds: &[SubKind]) -> Result<(), FeedError>;

    /// Stops push delivery for the symbols and kinds.
    async fn unsubscribe(&self, symbols: &[String], kinds: &[SubKind]) -> Result<(), FeedError>;
}
