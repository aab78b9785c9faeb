//! Factor analytics over feed point queries.
//!
//! Aggregations the dashboard layer polls per ticker: session stat,
//! capital flow, near-the-money volatility, day-over-day closes, pre-market
//! change, and cross-universe correlation. Everything here is a read-only
//! derivation; no engine state is touched.

use crate::error::EngineError;
use crate::feed::{CandleBar, FeedError, QuoteFeed, TradingCalendar};
use crate::symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

const MILLION: Decimal = rust_decimal_macros::dec!(1000000);

/// Session reference close and the day's range relative to it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStat {
    /// Previous close while the market is open, last trade otherwise.
    pub reference_close: Decimal,
    /// Day high minus previous close.
    pub high_delta: Decimal,
    /// Day low minus previous close.
    pub low_delta: Decimal,
}

/// Net capital flow, split by order size class, in millions.
#[derive(Debug, Clone, Serialize)]
pub struct CapitalFlowSummary {
    /// Latest interval's net inflow, in millions (2 dp).
    pub net_inflow_millions: Decimal,
    /// Net large-order flow, in millions (2 dp).
    pub large_millions: Decimal,
    /// Net medium-order flow, in millions (2 dp).
    pub medium_millions: Decimal,
    /// Net small-order flow, in millions (2 dp).
    pub small_millions: Decimal,
    /// Timestamp of the latest flow line, if any was reported.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Implied/historical volatility over the near-the-money window.
#[derive(Debug, Clone, Serialize)]
pub struct VolatilitySummary {
    /// Mean implied volatility across the put and call window.
    pub mean_iv: Decimal,
    /// Mean historical volatility across the put and call window.
    pub mean_hv: Decimal,
    /// Window strikes, ascending.
    pub strikes: Vec<Decimal>,
    /// Per-strike put implied volatility.
    pub put_iv: Vec<Decimal>,
    /// Per-strike call implied volatility.
    pub call_iv: Vec<Decimal>,
    /// Timestamp of the first quote, if any.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Pre-market percent change for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct PreMarketChange {
    /// Lowercase local ticker.
    pub ticker: String,
    /// Percent change from the previous close (2 dp).
    pub percent: Decimal,
}

/// Intraday price correlation against one universe member.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationEntry {
    /// Lowercase local ticker of the counterpart.
    pub ticker: String,
    /// Counterpart's latest indicator delta.
    pub latest_delta: Decimal,
    /// Pearson correlation coefficient (2 dp).
    pub coefficient: f64,
}

/// Reference close plus day-range deltas for one underlying.
///
/// # Errors
/// Feed faults and unknown symbols.
pub async fn session_stat<F: QuoteFeed>(
    feed: &F,
    calendar: &dyn TradingCalendar,
    market: &str,
    ticker: &str,
) -> Result<SessionStat, EngineError> {
    let feed_sym = symbol::feed_symbol(ticker, market);
    let quote = feed
        .quote(std::slice::from_ref(&feed_sym))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::UnknownSymbol(feed_sym.clone()))?;
    let reference_close = if calendar.is_market_open() {
        quote.prev_close
    } else {
        quote.last_done
    };
    Ok(SessionStat {
        reference_close,
        high_delta: quote.high - quote.prev_close,
        low_delta: quote.low - quote.prev_close,
    })
}

/// Latest net inflow and size-class distribution, in millions.
///
/// # Errors
/// Feed faults.
pub async fn capital_flow_summary<F: QuoteFeed>(
    feed: &F,
    market: &str,
    ticker: &str,
) -> Result<CapitalFlowSummary, EngineError> {
    let feed_sym = symbol::feed_symbol(ticker, market);
    let lines = feed.capital_flow(&feed_sym).await?;
    let (net_inflow_millions, timestamp) = match lines.last() {
        Some(line) => ((line.inflow / MILLION).round_dp(2), Some(line.timestamp)),
        None => (Decimal::ZERO, None),
    };

    let dist = feed.capital_distribution(&feed_sym).await?;
    Ok(CapitalFlowSummary {
        net_inflow_millions,
        large_millions: net_millions(dist.large_in, dist.large_out),
        medium_millions: net_millions(dist.medium_in, dist.medium_out),
        small_millions: net_millions(dist.small_in, dist.small_out),
        timestamp,
    })
}

fn net_millions(inflow: Decimal, outflow: Decimal) -> Decimal {
    ((inflow - outflow) / MILLION).round_dp(2)
}

/// Mean IV/HV plus per-strike implied vols over the quoted window.
///
/// Quotes are fetched live; the symbol lists come from the caller's chain
/// views so puts and calls share the same strikes.
///
/// # Errors
/// Feed faults.
pub async fn volatility_summary<F: QuoteFeed>(
    feed: &F,
    put_symbols: &[String],
    call_symbols: &[String],
    strikes: Vec<Decimal>,
) -> Result<VolatilitySummary, EngineError> {
    let mut symbols = Vec::with_capacity(put_symbols.len() + call_symbols.len());
    symbols.extend_from_slice(put_symbols);
    symbols.extend_from_slice(call_symbols);
    let quotes = feed.option_quote(&symbols).await?;

    let count = Decimal::from(quotes.len().max(1));
    let mean_iv = quotes.iter().map(|q| q.implied_volatility).sum::<Decimal>() / count;
    let mean_hv = quotes
        .iter()
        .map(|q| q.historical_volatility)
        .sum::<Decimal>()
        / count;

    let iv_of = |symbol: &String| {
        quotes
            .iter()
            .find(|q| &q.symbol == symbol)
            .map_or(Decimal::ZERO, |q| q.implied_volatility)
    };
    Ok(VolatilitySummary {
        mean_iv,
        mean_hv,
        strikes,
        put_iv: put_symbols.iter().map(iv_of).collect(),
        call_iv: call_symbols.iter().map(iv_of).collect(),
        timestamp: quotes.first().map(|q| q.timestamp),
    })
}

/// Day-over-day close differences, newest first (2 dp).
///
/// While the market is open the last candle is still forming and is dropped
/// before differencing.
#[must_use]
pub fn close_changes(bars: &[CandleBar], market_open: bool) -> Vec<Decimal> {
    let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
    let data = if market_open && !closes.is_empty() {
        &closes[..closes.len() - 1]
    } else {
        &closes[..]
    };
    (1..data.len())
        .rev()
        .map(|j| (data[j] - data[j - 1]).round_dp(2))
        .collect()
}

/// Pre-market percent change for the ticker and each benchmark.
///
/// Symbols whose feed quote carries no pre-market section are omitted. The
/// requested ticker, when present, is the first entry.
///
/// # Errors
/// Feed faults.
pub async fn pre_market_changes<F: QuoteFeed>(
    feed: &F,
    market: &str,
    ticker: &str,
    benchmarks: &[String],
) -> Result<Vec<PreMarketChange>, EngineError> {
    let mut symbols = vec![symbol::feed_symbol(ticker, market)];
    symbols.extend(
        benchmarks
            .iter()
            .filter(|b| b.as_str() != ticker)
            .map(|b| symbol::feed_symbol(b, market)),
    );
    let quotes = feed.quote(&symbols).await?;

    let mut changes = Vec::with_capacity(quotes.len());
    for quote in &quotes {
        let Some(pre) = &quote.pre_market else {
            continue;
        };
        if pre.prev_close == Decimal::ZERO {
            continue;
        }
        let percent =
            ((pre.last_done - pre.prev_close) / pre.prev_close * Decimal::ONE_HUNDRED).round_dp(2);
        changes.push(PreMarketChange {
            ticker: symbol::local_ticker(&quote.symbol),
            percent,
        });
    }
    Ok(changes)
}

/// Pearson correlation coefficient of two equal-length series.
///
/// Series of different lengths are truncated to the shorter one. Returns
/// `None` for fewer than two points or zero variance.
#[must_use]
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let nf = n as f64;
    let mean_a = a.iter().sum::<f64>() / nf;
    let mean_b = b.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
