//! Option-chain cache with near-the-money quote windows.
//!
//! Chain entries are keyed by (ticker, option type, expiry index) and hold a
//! strike-ascending list of contract quote records around the money. During
//! trading hours an entry is rebuilt per refreshing request; outside them a
//! prior entry is served as-is. Quote pushes are routed to entries through
//! per-subscription [`ChainView`]s, so concurrent consumers of different
//! chains never overwrite each other's routing.

use crate::error::EngineError;
use crate::feed::{QuoteFeed, QuotePush, TradingCalendar};
use crate::symbol::{self, OptionSymbol, OptionType};
use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Cache key: one chain entry per (ticker, type, expiry index).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    /// Lowercase local ticker.
    pub ticker: String,
    /// Put or call.
    pub option_type: OptionType,
    /// Index into the feed's listed expiry dates.
    pub expiry_index: usize,
}

/// One contract's quote record inside a chain entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractQuote {
    /// Exchange-qualified contract symbol.
    pub symbol: String,
    /// Human-readable contract name.
    pub name: String,
    /// Strike price.
    pub strike: Decimal,
    /// Last traded price.
    pub last_done: Decimal,
    /// Previous session close.
    pub prev_close: Decimal,
    /// Last price minus previous close.
    pub change: Decimal,
    /// Session high.
    pub day_high: Decimal,
    /// Session low.
    pub day_low: Decimal,
    /// Cumulative session volume.
    pub volume: u64,
    /// Open interest.
    pub open_interest: u64,
    /// Implied volatility, as a fraction.
    pub implied_volatility: Decimal,
}

impl ContractQuote {
    fn unquoted(symbol: String, name: String, strike: Decimal) -> Self {
        Self {
            symbol,
            name,
            strike,
            last_done: Decimal::ZERO,
            prev_close: Decimal::ZERO,
            change: Decimal::ZERO,
            day_high: Decimal::ZERO,
            day_low: Decimal::ZERO,
            volume: 0,
            open_interest: 0,
            implied_volatility: Decimal::ZERO,
        }
    }
}

type Entry = Arc<RwLock<Vec<ContractQuote>>>;

/// Locates the strike pair bracketing `spot` in a strike-ascending ladder.
///
/// Returns `(i, i)` on an exact match, otherwise `(i, i + 1)` such that
/// `strikes[i] <= spot < strikes[i + 1]`. A spot below the lowest strike
/// yields `(-1, 0)` and above the highest `(len - 1, len)`; callers clamp.
#[must_use]
pub fn near_the_money_index(strikes: &[Decimal], spot: Decimal) -> (isize, isize) {
    let mut left: isize = 0;
    let mut right: isize = strikes.len() as isize - 1;
    while left <= right {
        let mid = (left + right) / 2;
        match strikes[mid as usize].cmp(&spot) {
            Ordering::Equal => return (mid, mid),
            Ordering::Less => left = mid + 1,
            Ordering::Greater => right = mid - 1,
        }
    }
    (right, left)
}

/// Selects the quoted window of row indices around the money.
///
/// `num_quoted` contracts split evenly below and above the bracket, plus
/// `otm_bias` extra rows on the out-of-the-money side. Indices falling off
/// either end of the ladder are clamped into range and deduplicated, which
/// also collapses the doubled center row of an exact strike match.
#[must_use]
pub fn quote_window(
    len: usize,
    bracket: (isize, isize),
    num_quoted: usize,
    otm_bias: usize,
    otm_below: bool,
) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let (l, r) = bracket;
    let half = (num_quoted / 2) as isize;
    let (mut low_extra, mut high_extra) = (0isize, 0isize);
    if otm_below {
        low_extra = otm_bias as isize;
    } else {
        high_extra = otm_bias as isize;
    }

    let max = len as isize - 1;
    let mut indices: Vec<usize> = ((l - half + 1 - low_extra)..=l)
        .chain(r..=(r + half - 1 + high_extra))
        .map(|i| i.clamp(0, max) as usize)
        .collect();
    indices.dedup();
    indices
}

/// The target weekly expiry for a given date: the coming Friday on Monday
/// and Tuesday, otherwise the following week's Friday.
#[must_use]
pub fn weekly_expiry(today: NaiveDate) -> NaiveDate {
    let weekday = i64::from(today.weekday().num_days_from_monday());
    let days_ahead = if weekday <= 1 {
        4 - weekday
    } else {
        4 - weekday + 7
    };
    today + chrono::Duration::days(days_ahead)
}

/// A consumer's handle onto one cached chain entry.
///
/// Carries the symbol-to-row routing for exactly the contracts this consumer
/// requested; quote pushes are applied through it, so two consumers viewing
/// different chains cannot clobber each other's routing table.
#[derive(Debug)]
pub struct ChainView {
    /// Subscription identity.
    pub id: Uuid,
    key: ChainKey,
    entry: Entry,
    routing: HashMap<String, usize>,
}

impl ChainView {
    /// The cache key this view is attached to.
    #[must_use]
    pub fn key(&self) -> &ChainKey {
        &self.key
    }

    /// Symbols of the contracts in this view, strike-ascending.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.entry.read().iter().map(|c| c.symbol.clone()).collect()
    }

    /// Strikes of the contracts in this view, ascending.
    #[must_use]
    pub fn strikes(&self) -> Vec<Decimal> {
        self.entry.read().iter().map(|c| c.strike).collect()
    }

    /// A point-in-time copy of the entry's contract records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContractQuote> {
        self.entry.read().clone()
    }

    /// Routes one quote push into the cached entry.
    ///
    /// Returns `false` (and drops the event) for symbols outside this view.
    pub fn apply(&self, push: &QuotePush) -> bool {
        let Some(&row) = self.routing.get(&push.symbol) else {
            return false;
        };
        let mut entry = self.entry.write();
        let Some(contract) = entry.get_mut(row) else {
            return false;
        };
        contract.last_done = push.last_done;
        contract.change = push.last_done - contract.prev_close;
        contract.day_high = push.day_high;
        contract.day_low = push.day_low;
        contract.volume = push.volume;
        true
    }
}

/// Keyed cache of option-chain entries.
pub struct ChainCache {
    entries: DashMap<ChainKey, Entry>,
    market: String,
    num_quoted: usize,
    otm_bias: usize,
}

impl ChainCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(market: &str, num_quoted: usize, otm_bias: usize) -> Self {
        Self {
            entries: DashMap::new(),
            market: market.to_string(),
            num_quoted,
            otm_bias,
        }
    }

    /// Returns the chain entry for the key, building or refreshing it as
    /// needed, wrapped in a fresh [`ChainView`].
    ///
    /// A cached entry is served as-is when `refresh_quotes` is off or the
    /// market is closed. Otherwise the contract list is refetched, names are
    /// derived through the codec, and live quotes are spliced over the
    /// near-the-money window.
    ///
    /// # Errors
    /// Feed faults, codec failures on venue symbols, an out-of-range expiry
    /// index, or an empty contract list.
    pub async fn chain<F: QuoteFeed>(
        &self,
        feed: &F,
        calendar: &dyn TradingCalendar,
        ticker: &str,
        expiry_index: usize,
        option_type: OptionType,
        refresh_quotes: bool,
    ) -> Result<ChainView, EngineError> {
        let key = ChainKey {
            ticker: ticker.to_string(),
            option_type,
            expiry_index,
        };

        if let Some(entry) = self.entries.get(&key) {
            if !refresh_quotes || !calendar.is_market_open() {
                let entry = Arc::clone(entry.value());
                return Ok(Self::view_of(key, entry));
            }
        }

        let feed_sym = symbol::feed_symbol(ticker, &self.market);
        let expiries = feed.expiry_dates(&feed_sym).await?;
        let expiry = expiries
            .get(expiry_index)
            .copied()
            .ok_or(EngineError::ExpiryOutOfRange {
                index: expiry_index,
                available: expiries.len(),
            })?;
        let rows = feed.chain_by_date(&feed_sym, expiry).await?;
        if rows.is_empty() {
            return Err(EngineError::EmptyChain(ticker.to_string()));
        }

        let spot = feed
            .quote(std::slice::from_ref(&feed_sym))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| crate::feed::FeedError::UnknownSymbol(feed_sym.clone()))?
            .last_done;

        let strikes: Vec<Decimal> = rows.iter().map(|r| r.strike).collect();
        let bracket = near_the_money_index(&strikes, spot);
        let window = quote_window(
            rows.len(),
            bracket,
            self.num_quoted,
            self.otm_bias,
            option_type == OptionType::Put,
        );

        let mut contracts = Vec::with_capacity(window.len());
        let mut routing = HashMap::with_capacity(window.len());
        for (slot, &row) in window.iter().enumerate() {
            let raw = match option_type {
                OptionType::Call => &rows[row].call_symbol,
                OptionType::Put => &rows[row].put_symbol,
            };
            let parsed = OptionSymbol::parse(raw)?;
            routing.insert(raw.clone(), slot);
            contracts.push(ContractQuote::unquoted(
                raw.clone(),
                parsed.display_name(),
                rows[row].strike,
            ));
        }

        if refresh_quotes {
            let symbols: Vec<String> = contracts.iter().map(|c| c.symbol.clone()).collect();
            for quote in feed.option_quote(&symbols).await? {
                if let Some(&slot) = routing.get(&quote.symbol) {
                    let c = &mut contracts[slot];
                    c.last_done = quote.last_done;
                    c.prev_close = quote.prev_close;
                    c.change = quote.last_done - quote.prev_close;
                    c.day_high = quote.high;
                    c.day_low = quote.low;
                    c.volume = quote.volume;
                    c.open_interest = quote.open_interest;
                    c.implied_volatility = quote.implied_volatility;
                }
            }
        }

        debug!(
            ticker,
            %option_type,
            expiry_index,
            contracts = contracts.len(),
            refreshed = refresh_quotes,
            "chain entry rebuilt"
        );

        let entry: Entry = Arc::new(RwLock::new(contracts));
        self.entries.insert(key.clone(), Arc::clone(&entry));
        Ok(ChainView {
            id: Uuid::new_v4(),
            key,
            entry,
            routing,
        })
    }

    /// Builds a view over an existing entry, deriving routing from its rows.
    fn view_of(key: ChainKey, entry: Entry) -> ChainView {
        let routing = entry
            .read()
            .iter()
            .enumerate()
            .map(|(slot, c)| (c.symbol.clone(), slot))
            .collect();
        ChainView {
            id: Uuid::new_v4(),
            key,
            entry,
            routing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FixedCalendar, MockFeed};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ladder() -> Vec<Decimal> {
        vec![dec!(90), dec!(95), dec!(100), dec!(105), dec!(110)]
    }

    #[test]
    fn test_near_the_money_exact_match() {
        assert_eq!(near_the_money_index(&ladder(), dec!(100)), (2, 2));
    }

    #[test]
    fn test_near_the_money_between_strikes() {
        assert_eq!(near_the_money_index(&ladder(), dec!(97)), (1, 2));
    }

    #[test]
    fn test_near_the_money_out_of_range() {
        assert_eq!(near_the_money_index(&ladder(), dec!(80)), (-1, 0));
        assert_eq!(near_the_money_index(&ladder(), dec!(120)), (4, 5));
    }

    #[test]
    fn test_quote_window_centered() {
        // Bracket (1, 2) in a 10-row ladder, 6 quoted: rows -1..=1 and 2..=4.
        assert_eq!(quote_window(10, (1, 2), 6, 0, false), vec![0, 1, 2, 3, 4]);
        assert_eq!(quote_window(10, (4, 5), 6, 0, false), vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_quote_window_exact_match_dedups_center() {
        assert_eq!(quote_window(10, (4, 4), 6, 0, false), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_quote_window_clamps_at_both_ends() {
        assert_eq!(quote_window(5, (-1, 0), 6, 0, false), vec![0, 1, 2]);
        assert_eq!(quote_window(5, (4, 5), 6, 0, false), vec![2, 3, 4]);
    }

    #[test]
    fn test_quote_window_otm_bias() {
        // Put bias extends the low-strike side.
        assert_eq!(
            quote_window(10, (4, 5), 6, 2, true),
            vec![0, 1, 2, 3, 4, 5, 6, 7]
        );
        // Call bias extends the high-strike side.
        assert_eq!(
            quote_window(10, (4, 5), 6, 2, false),
            vec![2, 3, 4, 5, 6, 7, 8, 9]
        );
    }

    #[test]
    fn test_weekly_expiry_rule() {
        // 2025-08-04 is a Monday.
        let friday = NaiveDate::from_ymd_opt(2025, 8, 8).unwrap();
        let next_friday = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        assert_eq!(weekly_expiry(NaiveDate::from_ymd_opt(2025, 8, 4).unwrap()), friday);
        assert_eq!(weekly_expiry(NaiveDate::from_ymd_opt(2025, 8, 5).unwrap()), friday);
        assert_eq!(weekly_expiry(NaiveDate::from_ymd_opt(2025, 8, 6).unwrap()), next_friday);
        assert_eq!(weekly_expiry(NaiveDate::from_ymd_opt(2025, 8, 8).unwrap()), next_friday);
        assert_eq!(weekly_expiry(NaiveDate::from_ymd_opt(2025, 8, 10).unwrap()), next_friday);
    }

    #[tokio::test]
    async fn test_chain_builds_quoted_window() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        let view = cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 0, OptionType::Call, true)
            .await
            .expect("chain");

        let contracts = view.snapshot();
        // Spot 101 brackets (2, 3) on [95..120 step 5]: rows 0..=5.
        assert_eq!(contracts.len(), 6);
        assert!(contracts.iter().all(|c| c.symbol.contains('C')));
        assert!(contracts.windows(2).all(|w| w[0].strike < w[1].strike));
        // Live quotes were spliced in.
        assert!(contracts.iter().any(|c| c.last_done > Decimal::ZERO));
        assert!(contracts.iter().all(|c| !c.name.is_empty()));
    }

    #[tokio::test]
    async fn test_chain_served_from_cache_when_market_closed() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        cache
            .chain(&feed, &FixedCalendar::closed(), "aapl", 0, OptionType::Put, true)
            .await
            .expect("first chain");
        let structure_calls = feed.chain_calls();

        let view = cache
            .chain(&feed, &FixedCalendar::closed(), "aapl", 0, OptionType::Put, true)
            .await
            .expect("second chain");
        assert_eq!(feed.chain_calls(), structure_calls);
        assert_eq!(view.snapshot().len(), 6);
    }

    #[tokio::test]
    async fn test_chain_refreshed_per_request_while_open() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 0, OptionType::Call, true)
            .await
            .expect("first chain");
        cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 0, OptionType::Call, true)
            .await
            .expect("second chain");
        assert_eq!(feed.chain_calls(), 2);
    }

    #[tokio::test]
    async fn test_chain_without_refresh_skips_quotes() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        let view = cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 0, OptionType::Call, false)
            .await
            .expect("chain");
        assert!(view.snapshot().iter().all(|c| c.last_done == Decimal::ZERO));
        assert_eq!(feed.option_quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_expiry_index_out_of_range() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        let err = cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 9, OptionType::Call, true)
            .await
            .expect_err("should fail");
        assert!(matches!(err, EngineError::ExpiryOutOfRange { index: 9, .. }));
    }

    #[tokio::test]
    async fn test_push_routing_mutates_mapped_row_only() {
        let feed = MockFeed::with_default_chain("aapl", dec!(101));
        let cache = ChainCache::new("US", 6, 0);
        let view = cache
            .chain(&feed, &FixedCalendar::open(), "aapl", 0, OptionType::Call, true)
            .await
            .expect("chain");

        let target = view.symbols()[2].clone();
        let routed = view.apply(&QuotePush {
            symbol: target.clone(),
            last_done: dec!(9.99),
            volume: 4242,
            day_high: dec!(10.50),
            day_low: dec!(1.25),
            timestamp: Utc::now(),
        });
        assert!(routed);

        let contracts = view.snapshot();
        assert_eq!(contracts[2].last_done, dec!(9.99));
        assert_eq!(contracts[2].volume, 4242);
        assert_eq!(contracts[2].day_high, dec!(10.50));
        assert!(contracts.iter().enumerate().all(|(i, c)| i == 2 || c.last_done != dec!(9.99)));

        // Unmapped symbols are dropped.
        assert!(!view.apply(&QuotePush {
            symbol: "MSFT250808C400000.US".to_string(),
            last_done: dec!(1),
            volume: 1,
            day_high: dec!(1),
            day_low: dec!(1),
            timestamp: Utc::now(),
        }));
    }
}
