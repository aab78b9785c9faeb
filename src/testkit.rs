//! Shared test doubles for the feed and broker boundaries.

use crate::broker::{
    OrderDetail, OrderSubmission, PositionLine, PurchaseEstimate, TradeError, TradeService,
};
use crate::feed::{
    CandleBar, CapitalDistribution, CapitalFlowLine, DepthSnapshot, FeedError, IntradayPoint,
    OptionQuoteSnapshot, PreMarketQuote, PriceLevel, QuoteFeed, QuoteSnapshot, StrikeRow, SubKind,
    TradingCalendar,
};
use crate::orders::{OrderSide, OrderState};
use crate::symbol::{OptionSymbol, OptionType};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Calendar pinned open or closed.
pub struct FixedCalendar(bool);

impl FixedCalendar {
    pub fn open() -> Self {
        Self(true)
    }

    pub fn closed() -> Self {
        Self(false)
    }
}

impl TradingCalendar for FixedCalendar {
    fn is_market_open(&self) -> bool {
        self.0
    }
}

/// Scripted quote feed that counts calls.
#[derive(Default)]
pub struct MockFeed {
    pub quotes: Mutex<HashMap<String, QuoteSnapshot>>,
    pub depths: Mutex<HashMap<String, DepthSnapshot>>,
    pub expiries: Mutex<Vec<NaiveDate>>,
    pub chain_rows: Mutex<Vec<StrikeRow>>,
    pub intraday_series: Mutex<HashMap<String, Vec<IntradayPoint>>>,
    pub capital_flows: Mutex<Vec<CapitalFlowLine>>,
    pub capital_dist: Mutex<Option<CapitalDistribution>>,
    pub candles: Mutex<HashMap<String, Vec<CandleBar>>>,
    chain_calls: AtomicUsize,
    option_quote_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed with a seven-strike ladder (90..120 step 5) expiring
    /// 2025-08-08 and 2025-08-15, and the underlying quoted at `spot`.
    pub fn with_default_chain(ticker: &str, spot: Decimal) -> Self {
        let feed = Self::new();
        feed.script_chain(ticker, NaiveDate::from_ymd_opt(2025, 8, 8).unwrap());
        feed.put_quote(&crate::symbol::feed_symbol(ticker, "US"), spot, spot);
        feed
    }

    /// Replaces the listed expiries with `expiry` (+ one week) and rebuilds
    /// the seven-strike ladder (90..120 step 5) for it.
    pub fn script_chain(&self, ticker: &str, expiry: NaiveDate) {
        *self.expiries.lock() = vec![expiry, expiry + chrono::Duration::days(7)];
        let mut rows = self.chain_rows.lock();
        rows.clear();
        for i in 0..7u32 {
            let strike = dec!(90) + Decimal::from(i * 5);
            let call = OptionSymbol::new(ticker, OptionType::Call, expiry, strike, "US")
                .unwrap()
                .format();
            let put = OptionSymbol::new(ticker, OptionType::Put, expiry, strike, "US")
                .unwrap()
                .format();
            rows.push(StrikeRow {
                strike,
                call_symbol: call,
                put_symbol: put,
            });
        }
    }

    pub fn put_quote(&self, symbol: &str, last_done: Decimal, prev_close: Decimal) {
        self.quotes.lock().insert(
            symbol.to_string(),
            QuoteSnapshot {
                symbol: symbol.to_string(),
                last_done,
                prev_close,
                high: last_done,
                low: prev_close,
                volume: 10_000,
                timestamp: Utc::now(),
                pre_market: None,
            },
        );
    }

    /// Attaches a pre-market section to an already scripted quote.
    pub fn set_pre_market(&self, symbol: &str, last_done: Decimal, prev_close: Decimal) {
        if let Some(quote) = self.quotes.lock().get_mut(symbol) {
            quote.pre_market = Some(PreMarketQuote {
                last_done,
                prev_close,
            });
        }
    }

    pub fn put_depth(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.depths.lock().insert(
            symbol.to_string(),
            DepthSnapshot {
                symbol: symbol.to_string(),
                bids: vec![PriceLevel {
                    price: bid,
                    quantity: 10,
                }],
                asks: vec![PriceLevel {
                    price: ask,
                    quantity: 10,
                }],
            },
        );
    }

    pub fn chain_calls(&self) -> usize {
        self.chain_calls.load(Ordering::SeqCst)
    }

    pub fn option_quote_calls(&self) -> usize {
        self.option_quote_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

impl QuoteFeed for MockFeed {
    async fn quote(&self, symbols: &[String]) -> Result<Vec<QuoteSnapshot>, FeedError> {
        let quotes = self.quotes.lock();
        Ok(symbols.iter().filter_map(|s| quotes.get(s).cloned()).collect())
    }

    async fn option_quote(
        &self,
        symbols: &[String],
    ) -> Result<Vec<OptionQuoteSnapshot>, FeedError> {
        self.option_quote_calls.fetch_add(1, Ordering::SeqCst);
        // Synthesized quotes: price and IV scale with the strike so tests
        // can tell rows apart.
        Ok(symbols
            .iter()
            .filter_map(|s| OptionSymbol::parse(s).ok().map(|p| (s, p)))
            .map(|(s, parsed)| OptionQuoteSnapshot {
                symbol: s.clone(),
                last_done: parsed.strike() / dec!(100),
                prev_close: parsed.strike() / dec!(110),
                high: parsed.strike() / dec!(95),
                low: parsed.strike() / dec!(120),
                volume: 500,
                open_interest: 1_000,
                implied_volatility: dec!(0.30) + parsed.strike() / dec!(10000),
                historical_volatility: dec!(0.25),
                timestamp: Utc::now(),
            })
            .collect())
    }

    async fn depth(&self, symbol: &str) -> Result<DepthSnapshot, FeedError> {
        self.depths
            .lock()
            .get(symbol)
            .cloned()
            .ok_or_else(|| FeedError::UnknownSymbol(symbol.to_string()))
    }

    async fn expiry_dates(&self, _symbol: &str) -> Result<Vec<NaiveDate>, FeedError> {
        Ok(self.expiries.lock().clone())
    }

    async fn chain_by_date(
        &self,
        _symbol: &str,
        _expiry: NaiveDate,
    ) -> Result<Vec<StrikeRow>, FeedError> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain_rows.lock().clone())
    }

    async fn intraday(&self, symbol: &str) -> Result<Vec<IntradayPoint>, FeedError> {
        Ok(self
            .intraday_series
            .lock()
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn capital_flow(&self, _symbol: &str) -> Result<Vec<CapitalFlowLine>, FeedError> {
        Ok(self.capital_flows.lock().clone())
    }

    async fn capital_distribution(
        &self,
        _symbol: &str,
    ) -> Result<CapitalDistribution, FeedError> {
        self.capital_dist
            .lock()
            .clone()
            .ok_or_else(|| FeedError::Unavailable("no distribution scripted".to_string()))
    }

    async fn candlesticks(&self, symbol: &str, count: usize) -> Result<Vec<CandleBar>, FeedError> {
        let candles = self.candles.lock();
        let bars = candles.get(symbol).cloned().unwrap_or_default();
        let start = bars.len().saturating_sub(count);
        Ok(bars[start..].to_vec())
    }

    async fn subscribe(&self, _symbols: &[String], _kinds: &[SubKind]) -> Result<(), FeedError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(&self, _symbols: &[String], _kinds: &[SubKind]) -> Result<(), FeedError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted trade service.
#[derive(Default)]
pub struct MockTrade {
    pub estimates: Mutex<HashMap<String, Result<PurchaseEstimate, TradeError>>>,
    pub details: Mutex<HashMap<String, OrderDetail>>,
    pub detail_failure: Mutex<Option<String>>,
    pub submissions: Mutex<Vec<OrderSubmission>>,
    pub position_lines: Mutex<Vec<PositionLine>>,
    detail_calls: AtomicUsize,
    next_order: AtomicUsize,
}

impl MockTrade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the detail the broker will report for an order id.
    pub fn script_detail(&self, order_id: &str, status: OrderState, exec: Decimal, quantity: u64) {
        self.details.lock().insert(
            order_id.to_string(),
            OrderDetail {
                order_id: order_id.to_string(),
                symbol: "AAPL250808P230000.US".to_string(),
                stock_name: "AAPL 08/08 230 Put".to_string(),
                status,
                executed_price: exec,
                quantity,
                submitted_at: Utc::now(),
            },
        );
    }

    /// Makes every detail fetch fail transiently.
    pub fn fail_details(&self, reason: &str) {
        *self.detail_failure.lock() = Some(reason.to_string());
    }

    pub fn script_estimate(&self, symbol: &str, cash_max: u64, margin_max: u64) {
        self.estimates.lock().insert(
            symbol.to_string(),
            Ok(PurchaseEstimate {
                cash_max,
                margin_max,
            }),
        );
    }

    pub fn script_estimate_error(&self, symbol: &str, err: TradeError) {
        self.estimates.lock().insert(symbol.to_string(), Err(err));
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

impl TradeService for MockTrade {
    async fn submit_order(&self, order: &OrderSubmission) -> Result<String, TradeError> {
        self.submissions.lock().push(order.clone());
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ord-{n}"))
    }

    async fn order_detail(&self, order_id: &str) -> Result<OrderDetail, TradeError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.detail_failure.lock().clone() {
            return Err(TradeError::Unavailable(reason));
        }
        self.details
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| TradeError::UnknownOrder(order_id.to_string()))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), TradeError> {
        Ok(())
    }

    async fn replace_order(
        &self,
        _order_id: &str,
        _quantity: u64,
        _price: Option<Decimal>,
    ) -> Result<(), TradeError> {
        Ok(())
    }

    async fn estimate_max_purchase_quantity(
        &self,
        symbol: &str,
        _side: OrderSide,
    ) -> Result<PurchaseEstimate, TradeError> {
        self.estimates
            .lock()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Err(TradeError::NotTradable(symbol.to_string())))
    }

    async fn positions(&self) -> Result<Vec<PositionLine>, TradeError> {
        Ok(self.position_lines.lock().clone())
    }
}
