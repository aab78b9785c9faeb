//! Engine façade: owns the component registries and wires them together.
//!
//! The transport layer holds one `Engine` for the life of the process,
//! pushes feed events into it, and invokes its query and order operations
//! from independent request tasks. All cross-component orchestration
//! (bootstrap, candidate selection, limit pricing, factor queries) lives
//! here, so the components themselves stay single-purpose.

use crate::broker::TradeService;
use crate::chain::{self, ChainCache, ChainView};
use crate::config::Config;
use crate::error::EngineError;
use crate::factors::{
    self, CapitalFlowSummary, CorrelationEntry, PreMarketChange, SessionStat, VolatilitySummary,
};
use crate::feed::{FeedError, QuoteFeed, QuotePush, SubKind, TradingCalendar};
use crate::indicator::{IndicatorEngine, IndicatorSnapshot};
use crate::orders::{
    self, Candidate, Moneyness, OrderKind, OrderRecord, OrderRequest, OrderSide, OrderState,
    PositionBook, PositionKey, SizingPolicy, SubmitOutcome,
};
use crate::pricing::{OptionValue, Pricer};
use crate::subscription::SubscriptionRegistry;
use crate::symbol::{self, OptionSymbol, OptionType};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The analytics and order-lifecycle engine.
///
/// Generic over the feed and trade-service implementations so production
/// venues and test doubles plug in without dynamic dispatch.
pub struct Engine<F, T> {
    /// Engine configuration.
    pub config: Config,
    /// External quote feed.
    pub feed: Arc<F>,
    /// External trade service.
    pub trade: Arc<T>,
    /// Trading-session check.
    pub calendar: Arc<dyn TradingCalendar>,
    /// Per-ticker indicator registry.
    pub indicators: IndicatorEngine,
    /// Option-chain cache.
    pub chains: ChainCache,
    /// Per-(ticker, type) position stacks.
    pub positions: PositionBook,
    /// Reference-counted feed subscriptions.
    pub subscriptions: SubscriptionRegistry,
    pricer: Pricer,
}

impl<F: QuoteFeed, T: TradeService> Engine<F, T> {
    /// Builds the engine and primes all per-ticker state.
    ///
    /// Reference closes are selected once here: the previous session close
    /// while the market is open, the last trade otherwise. Broker-held
    /// positions are seeded into the stacks as filled historical buys.
    ///
    /// # Errors
    /// Feed or trade-service faults during priming.
    pub async fn bootstrap(
        config: Config,
        feed: Arc<F>,
        trade: Arc<T>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self, EngineError> {
        let indicators = IndicatorEngine::new(config.indicator.memory);
        let market_open = calendar.is_market_open();

        let feed_symbols: Vec<String> = config
            .tickers
            .iter()
            .map(|tk| symbol::feed_symbol(tk, &config.market.suffix))
            .collect();
        let quotes = feed.quote(&feed_symbols).await?;

        for ticker in &config.tickers {
            let feed_sym = symbol::feed_symbol(ticker, &config.market.suffix);
            let reference = quotes.iter().find(|q| q.symbol == feed_sym).map(|q| {
                if market_open {
                    q.prev_close
                } else {
                    q.last_done
                }
            });
            match reference {
                Some(reference) => {
                    indicators.register(ticker, reference);
                    info!("registered {ticker} with reference close {reference}");
                }
                None => {
                    indicators.register(ticker, Decimal::ZERO);
                    warn!("no quote for {ticker} at bootstrap, reference close defaults to 0");
                }
            }
        }

        let positions = PositionBook::new(config.trading.contract_multiplier);
        let multiplier = Decimal::from(config.trading.contract_multiplier);
        for line in trade.positions().await? {
            let parsed = match OptionSymbol::parse(&line.symbol) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("skipping non-option position {}: {err}", line.symbol);
                    continue;
                }
            };
            if !config.tickers.contains(&parsed.ticker) {
                continue;
            }
            let key = PositionKey {
                ticker: parsed.ticker.clone(),
                option_type: parsed.option_type,
            };
            let record = OrderRecord {
                id: format!("HIST-{}", line.symbol),
                symbol: line.symbol.clone(),
                name: line.symbol_name.clone(),
                side: OrderSide::Buy,
                status: OrderState::Filled,
                quantity: line.quantity,
                executed_price: line.cost_price,
                total_cost: line.cost_price * Decimal::from(line.quantity) * multiplier,
                profit: Decimal::ZERO,
                submitted_at: None,
            };
            info!("seeded open position {} from broker", line.symbol);
            positions.seed(&key, record).await;
        }

        let chains = ChainCache::new(
            &config.market.suffix,
            config.chain.num_quoted,
            config.chain.otm_bias,
        );
        let pricer = Pricer::new(config.pricing.risk_free_rate, config.pricing.default_iv);

        Ok(Self {
            config,
            feed,
            trade,
            calendar,
            indicators,
            chains,
            positions,
            subscriptions: SubscriptionRegistry::new(),
            pricer,
        })
    }

    fn ensure_ticker(&self, ticker: &str) -> Result<(), EngineError> {
        if self.config.tickers.iter().any(|tk| tk == ticker) {
            Ok(())
        } else {
            Err(EngineError::UnknownTicker(ticker.to_string()))
        }
    }

    fn feed_symbol(&self, ticker: &str) -> String {
        symbol::feed_symbol(ticker, &self.config.market.suffix)
    }

    async fn spot(&self, ticker: &str) -> Result<Decimal, EngineError> {
        let feed_sym = self.feed_symbol(ticker);
        Ok(self
            .feed
            .quote(std::slice::from_ref(&feed_sym))
            .await?
            .into_iter()
            .next()
            .ok_or(FeedError::UnknownSymbol(feed_sym))?
            .last_done)
    }

    /// Consumes one underlying tick from the push stream.
    pub fn handle_quote(&self, push: &QuotePush) {
        let ticker = symbol::local_ticker(&push.symbol);
        self.indicators.on_tick(&ticker, push.last_done, push.volume);
    }

    /// Indicator snapshot for one ticker.
    #[must_use]
    pub fn indicator_snapshot(&self, ticker: &str) -> Option<IndicatorSnapshot> {
        self.indicators.snapshot(ticker)
    }

    /// Indicator snapshots for the whole universe, in configured order.
    #[must_use]
    pub fn indicator_snapshots(&self) -> Vec<IndicatorSnapshot> {
        self.config
            .tickers
            .iter()
            .filter_map(|tk| self.indicators.snapshot(tk))
            .collect()
    }

    /// Takes one subscription reference on the universe's quote stream.
    ///
    /// # Errors
    /// Venue subscription failures.
    pub async fn watch_universe(&self) -> Result<(), EngineError> {
        let symbols: Vec<String> = self
            .config
            .tickers
            .iter()
            .map(|tk| self.feed_symbol(tk))
            .collect();
        self.subscriptions
            .acquire(self.feed.as_ref(), &symbols, &[SubKind::Quote])
            .await
    }

    /// Drops one subscription reference on the universe's quote stream.
    ///
    /// # Errors
    /// Venue unsubscription failures.
    pub async fn unwatch_universe(&self) -> Result<(), EngineError> {
        let symbols: Vec<String> = self
            .config
            .tickers
            .iter()
            .map(|tk| self.feed_symbol(tk))
            .collect();
        self.subscriptions
            .release(self.feed.as_ref(), &symbols, &[SubKind::Quote])
            .await
    }

    /// Chain snapshot view for one (ticker, expiry index, type).
    ///
    /// # Errors
    /// Unknown tickers and chain-cache failures.
    pub async fn chain(
        &self,
        ticker: &str,
        expiry_index: usize,
        option_type: OptionType,
        refresh_quotes: bool,
    ) -> Result<ChainView, EngineError> {
        self.ensure_ticker(ticker)?;
        self.chains
            .chain(
                self.feed.as_ref(),
                self.calendar.as_ref(),
                ticker,
                expiry_index,
                option_type,
                refresh_quotes,
            )
            .await
    }

    /// Resolves the weekly target expiry against the feed's listed dates.
    ///
    /// # Errors
    /// [`EngineError::NoListedExpiry`] when nothing is listed on or after
    /// the target Friday.
    pub async fn default_expiry_index(&self, ticker: &str) -> Result<usize, EngineError> {
        let target = chain::weekly_expiry(chrono::Utc::now().date_naive());
        let dates = self.feed.expiry_dates(&self.feed_symbol(ticker)).await?;
        dates
            .iter()
            .position(|d| *d >= target)
            .ok_or(EngineError::NoListedExpiry {
                ticker: ticker.to_string(),
                target,
            })
    }

    /// Selects the first purchasable contract for the policy, or `None`
    /// when every candidate is exhausted.
    ///
    /// Candidates are the near-the-money window of the weekly expiry,
    /// restricted to the moneyness side and tried in ascending-strike
    /// order. Unsizeable contracts are skipped.
    ///
    /// # Errors
    /// Unknown tickers, chain failures, and transient sizing faults.
    pub async fn open_position(
        &self,
        ticker: &str,
        option_type: OptionType,
        sizing: SizingPolicy,
        moneyness: Moneyness,
    ) -> Result<Option<Candidate>, EngineError> {
        self.ensure_ticker(ticker)?;
        let expiry_index = self.default_expiry_index(ticker).await?;
        let view = self
            .chain(ticker, expiry_index, option_type, true)
            .await?;
        let spot = self.spot(ticker).await?;

        let prefer_below = matches!(
            (option_type, moneyness),
            (OptionType::Put, Moneyness::OutOfTheMoney)
                | (OptionType::Call, Moneyness::InTheMoney)
        );
        for contract in view
            .snapshot()
            .iter()
            .filter(|c| (c.strike <= spot) == prefer_below)
        {
            if let Some(quantity) =
                orders::size_candidate(self.trade.as_ref(), &contract.symbol, sizing).await?
            {
                return Ok(Some(Candidate {
                    symbol: contract.symbol.clone(),
                    name: contract.name.clone(),
                    quantity,
                }));
            }
        }
        Ok(None)
    }

    /// Places an order per the request and appends the resulting record.
    ///
    /// Buys select their contract via [`Engine::open_position`];
    /// `NoViableContract` is a normal outcome there. Sells close the
    /// top-of-stack filled buy. Limit buys price at best bid minus the
    /// configured offset, limit sells at best ask.
    ///
    /// # Errors
    /// Unknown tickers, missing depth for limit pricing, missing open
    /// position for sells, and broker faults.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<SubmitOutcome, EngineError> {
        self.ensure_ticker(&request.ticker)?;
        let key = PositionKey {
            ticker: request.ticker.clone(),
            option_type: request.option_type,
        };
        let settle = self.config.trading.settle();

        match request.side {
            OrderSide::Buy => {
                let Some(candidate) = self
                    .open_position(
                        &request.ticker,
                        request.option_type,
                        request.sizing,
                        request.moneyness,
                    )
                    .await?
                else {
                    return Ok(SubmitOutcome::NoViableContract);
                };
                let limit_price = match request.kind {
                    OrderKind::Market => None,
                    OrderKind::Limit => Some(self.limit_buy_price(&candidate.symbol).await?),
                };
                let record = self
                    .positions
                    .submit_buy(
                        self.trade.as_ref(),
                        &key,
                        &candidate,
                        request.kind,
                        limit_price,
                        settle,
                    )
                    .await?;
                Ok(SubmitOutcome::Submitted(record))
            }
            OrderSide::Sell => {
                let limit_price = match request.kind {
                    OrderKind::Market => None,
                    OrderKind::Limit => {
                        let open = self
                            .positions
                            .reconcile(self.trade.as_ref(), &key)
                            .await?
                            .ok_or_else(|| EngineError::NoOpenPosition {
                                ticker: key.ticker.clone(),
                                option_type: key.option_type,
                            })?;
                        Some(self.limit_sell_price(&open.symbol).await?)
                    }
                };
                let record = self
                    .positions
                    .submit_sell(self.trade.as_ref(), &key, request.kind, limit_price, settle)
                    .await?;
                Ok(SubmitOutcome::Submitted(record))
            }
        }
    }

    async fn limit_buy_price(&self, contract_symbol: &str) -> Result<Decimal, EngineError> {
        let depth = self.feed.depth(contract_symbol).await?;
        let bid = depth
            .best_bid()
            .ok_or_else(|| EngineError::NoDepth(contract_symbol.to_string()))?;
        Ok(bid.price - self.config.trading.limit_offset())
    }

    async fn limit_sell_price(&self, contract_symbol: &str) -> Result<Decimal, EngineError> {
        let depth = self.feed.depth(contract_symbol).await?;
        let ask = depth
            .best_ask()
            .ok_or_else(|| EngineError::NoDepth(contract_symbol.to_string()))?;
        Ok(ask.price)
    }

    /// Reconciles the stack for the key and returns the open position.
    ///
    /// # Errors
    /// Unknown tickers and transient broker faults (retry; local state is
    /// untouched on failure).
    pub async fn reconcile(
        &self,
        ticker: &str,
        option_type: OptionType,
    ) -> Result<Option<OrderRecord>, EngineError> {
        self.ensure_ticker(ticker)?;
        let key = PositionKey {
            ticker: ticker.to_string(),
            option_type,
        };
        self.positions.reconcile(self.trade.as_ref(), &key).await
    }

    /// Full order history for the key.
    ///
    /// # Errors
    /// Unknown tickers.
    pub async fn order_history(
        &self,
        ticker: &str,
        option_type: OptionType,
    ) -> Result<Vec<OrderRecord>, EngineError> {
        self.ensure_ticker(ticker)?;
        let key = PositionKey {
            ticker: ticker.to_string(),
            option_type,
        };
        Ok(self.positions.history(&key).await)
    }

    /// Requests cancellation of an order; local state converges on the next
    /// reconcile.
    ///
    /// # Errors
    /// Broker faults.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        self.trade.cancel_order(order_id).await?;
        Ok(())
    }

    /// Amends an open order; local state converges on the next reconcile.
    ///
    /// # Errors
    /// Broker faults.
    pub async fn replace_order(
        &self,
        order_id: &str,
        quantity: u64,
        price: Option<Decimal>,
    ) -> Result<(), EngineError> {
        self.trade.replace_order(order_id, quantity, price).await?;
        Ok(())
    }

    /// Values an option with the configured rate and IV defaults.
    ///
    /// # Errors
    /// Domain violations (non-positive expiry, volatility, spot, strike).
    pub fn price_option(
        &self,
        spot: f64,
        strike: f64,
        t_years: f64,
        iv: Option<f64>,
        option_type: OptionType,
    ) -> Result<OptionValue, EngineError> {
        Ok(self.pricer.value(spot, strike, t_years, iv, option_type)?)
    }

    /// Session stat factor for one ticker.
    ///
    /// # Errors
    /// Unknown tickers and feed faults.
    pub async fn session_stat(&self, ticker: &str) -> Result<SessionStat, EngineError> {
        self.ensure_ticker(ticker)?;
        factors::session_stat(
            self.feed.as_ref(),
            self.calendar.as_ref(),
            &self.config.market.suffix,
            ticker,
        )
        .await
    }

    /// Capital-flow factor for one ticker.
    ///
    /// # Errors
    /// Unknown tickers and feed faults.
    pub async fn capital_flow(&self, ticker: &str) -> Result<CapitalFlowSummary, EngineError> {
        self.ensure_ticker(ticker)?;
        factors::capital_flow_summary(self.feed.as_ref(), &self.config.market.suffix, ticker).await
    }

    /// Volatility factor over the weekly near-the-money window.
    ///
    /// # Errors
    /// Unknown tickers, chain failures, and feed faults.
    pub async fn volatility_summary(&self, ticker: &str) -> Result<VolatilitySummary, EngineError> {
        self.ensure_ticker(ticker)?;
        let expiry_index = self.default_expiry_index(ticker).await?;
        let puts = self.chain(ticker, expiry_index, OptionType::Put, false).await?;
        let calls = self.chain(ticker, expiry_index, OptionType::Call, false).await?;
        factors::volatility_summary(
            self.feed.as_ref(),
            &puts.symbols(),
            &calls.symbols(),
            puts.strikes(),
        )
        .await
    }

    /// Day-over-day close changes, newest first.
    ///
    /// # Errors
    /// Unknown tickers and feed faults.
    pub async fn prev_close_changes(&self, ticker: &str) -> Result<Vec<Decimal>, EngineError> {
        self.ensure_ticker(ticker)?;
        let bars = self
            .feed
            .candlesticks(&self.feed_symbol(ticker), 12)
            .await?;
        Ok(factors::close_changes(&bars, self.calendar.is_market_open()))
    }

    /// Pre-market change for the ticker and configured benchmarks.
    ///
    /// # Errors
    /// Unknown tickers and feed faults.
    pub async fn pre_market(&self, ticker: &str) -> Result<Vec<PreMarketChange>, EngineError> {
        self.ensure_ticker(ticker)?;
        factors::pre_market_changes(
            self.feed.as_ref(),
            &self.config.market.suffix,
            ticker,
            &self.config.market.benchmarks,
        )
        .await
    }

    /// Intraday price correlation of the ticker against the rest of the
    /// universe, strongest first.
    ///
    /// # Errors
    /// Unknown tickers and feed faults.
    pub async fn correlations(&self, ticker: &str) -> Result<Vec<CorrelationEntry>, EngineError> {
        self.ensure_ticker(ticker)?;

        let mut series = Vec::with_capacity(self.config.tickers.len());
        for tk in &self.config.tickers {
            let points = self.feed.intraday(&self.feed_symbol(tk)).await?;
            let values: Vec<f64> = points
                .iter()
                .filter_map(|p| p.avg_price.to_f64())
                .collect();
            series.push((tk.clone(), values));
            // Spread point queries out; venues rate limit the intraday call.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let target = series
            .iter()
            .find(|(tk, _)| tk == ticker)
            .map(|(_, values)| values.clone())
            .unwrap_or_default();

        let mut entries: Vec<CorrelationEntry> = series
            .into_iter()
            .filter(|(tk, _)| tk != ticker)
            .filter_map(|(tk, values)| {
                let coefficient = factors::pearson(&target, &values)?;
                let latest_delta = self
                    .indicators
                    .snapshot(&tk)
                    .map_or(Decimal::ZERO, |s| s.delta);
                Some(CorrelationEntry {
                    ticker: tk,
                    latest_delta,
                    coefficient: (coefficient * 100.0).round() / 100.0,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.coefficient
                .partial_cmp(&a.coefficient)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(entries)
    }
}
