//! Order-lifecycle types and per-(ticker, option-type) position stacks.
//!
//! Each stack is the append-only history of orders for one key. Locally
//! submitted orders start as `submitted` and transition at most once more,
//! to a terminal state, when the broker's asynchronously reported status is
//! reconciled in. Canceled and rejected tops are popped rather than kept, so
//! the stack never exposes an invalid open position, while fills stay in
//! history as the P&L audit trail.

use crate::broker::{OrderSubmission, TradeError, TradeService};
use crate::error::EngineError;
use crate::symbol::OptionType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Order side for trading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle state.
///
/// `Submitted` transitions at most once, to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Accepted locally, not yet terminal at the broker.
    Submitted,
    /// Fully executed.
    Filled,
    /// Canceled at the broker.
    Canceled,
    /// Rejected by the broker.
    Rejected,
}

impl OrderState {
    /// Whether the state admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Filled => write!(f, "filled"),
            Self::Canceled => write!(f, "canceled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Market or limit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Market order (default).
    #[default]
    Market,
    /// Limit order.
    Limit,
}

/// How many contracts to buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingPolicy {
    /// One contract, if cash allows (default).
    #[default]
    Minimal,
    /// As many as settled cash allows.
    CashMax,
    /// As many as margin allows.
    MarginMax,
    /// Exactly `n`, capped at what cash allows.
    Exact(u64),
}

/// Strike preference relative to spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Moneyness {
    /// Prefer in-the-money strikes (default).
    #[default]
    #[serde(rename = "itm")]
    InTheMoney,
    /// Prefer out-of-the-money strikes.
    #[serde(rename = "otm")]
    OutOfTheMoney,
}

/// A sized, purchasable contract selected by candidate search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Exchange-qualified contract symbol.
    pub symbol: String,
    /// Human-readable contract name.
    pub name: String,
    /// Contracts to buy.
    pub quantity: u64,
}

/// An order placement request from the request layer.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    /// Underlying ticker.
    pub ticker: String,
    /// Put or call.
    pub option_type: OptionType,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market or limit.
    #[serde(default)]
    pub kind: OrderKind,
    /// Sizing policy for buys.
    #[serde(default)]
    pub sizing: SizingPolicy,
    /// Strike preference for buys.
    #[serde(default)]
    pub moneyness: Moneyness,
}

/// Outcome of an order placement.
#[derive(Debug, Clone, Serialize)]
pub enum SubmitOutcome {
    /// Order was submitted; the appended record follows.
    Submitted(OrderRecord),
    /// Every candidate was exhausted; nothing was submitted.
    ///
    /// A normal, non-fatal result for buys.
    NoViableContract,
}

/// One order in a position stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Broker order id, or `HIST-{symbol}` for seeded positions.
    pub id: String,
    /// Exchange-qualified contract symbol.
    pub symbol: String,
    /// Human-readable contract name.
    pub name: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Lifecycle state.
    pub status: OrderState,
    /// Contracts ordered.
    pub quantity: u64,
    /// Executed price; zero until filled.
    pub executed_price: Decimal,
    /// Cash outlay for filled buys.
    pub total_cost: Decimal,
    /// Realized profit for filled sells.
    pub profit: Decimal,
    /// Submission timestamp, when the broker reported one.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Stack key: one position history per (ticker, option type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    /// Lowercase local ticker.
    pub ticker: String,
    /// Put or call.
    pub option_type: OptionType,
}

type Stack = Arc<Mutex<Vec<OrderRecord>>>;

/// Per-key order stacks with broker reconciliation.
///
/// The per-key `tokio` mutex is held across broker awaits, so at most one
/// lifecycle transition is in flight per key while different keys proceed
/// concurrently.
pub struct PositionBook {
    stacks: DashMap<PositionKey, Stack>,
    multiplier: Decimal,
}

impl PositionBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new(contract_multiplier: u32) -> Self {
        Self {
            stacks: DashMap::new(),
            multiplier: Decimal::from(contract_multiplier),
        }
    }

    fn stack(&self, key: &PositionKey) -> Stack {
        Arc::clone(
            self.stacks
                .entry(key.clone())
                .or_insert_with(Stack::default)
                .value(),
        )
    }

    /// Appends a pre-existing record, used to seed broker-held positions at
    /// bootstrap.
    pub async fn seed(&self, key: &PositionKey, record: OrderRecord) {
        let stack = self.stack(key);
        stack.lock().await.push(record);
    }

    /// A copy of the full order history for the key.
    pub async fn history(&self, key: &PositionKey) -> Vec<OrderRecord> {
        let stack = self.stack(key);
        let guard = stack.lock().await;
        guard.clone()
    }

    /// Submits a buy of the selected candidate and appends the record.
    ///
    /// The record is appended whatever the broker reports: an immediately
    /// rejected order lands on the stack terminal and is popped by the next
    /// reconcile pass. If the post-submit detail fetch fails transiently the
    /// record stays `submitted` for a later reconcile.
    ///
    /// # Errors
    /// Submission failures; transient detail-fetch faults after submission
    /// are not errors here.
    pub async fn submit_buy<T: TradeService>(
        &self,
        trade: &T,
        key: &PositionKey,
        candidate: &Candidate,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        settle: Duration,
    ) -> Result<OrderRecord, EngineError> {
        let stack = self.stack(key);
        let mut guard = stack.lock().await;
        self.resolve_top(trade, &mut guard).await?;

        let submission = OrderSubmission {
            symbol: candidate.symbol.clone(),
            side: OrderSide::Buy,
            kind,
            quantity: candidate.quantity,
            limit_price,
        };
        let order_id = trade.submit_order(&submission).await?;
        tokio::time::sleep(settle).await;

        let mut record = OrderRecord {
            id: order_id.clone(),
            symbol: candidate.symbol.clone(),
            name: candidate.name.clone(),
            side: OrderSide::Buy,
            status: OrderState::Submitted,
            quantity: candidate.quantity,
            executed_price: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            profit: Decimal::ZERO,
            submitted_at: None,
        };
        match trade.order_detail(&order_id).await {
            Ok(detail) => {
                record.status = detail.status;
                record.quantity = detail.quantity;
                record.submitted_at = Some(detail.submitted_at);
                if detail.status == OrderState::Filled {
                    record.executed_price = detail.executed_price;
                    record.total_cost =
                        detail.executed_price * Decimal::from(detail.quantity) * self.multiplier;
                }
            }
            Err(err) => {
                warn!("order detail unavailable after submit of {order_id}: {err}");
            }
        }

        info!(
            "buy {} submitted for {}/{}: {}",
            order_id, key.ticker, key.option_type, record.status
        );
        guard.push(record.clone());
        Ok(record)
    }

    /// Closes the open position: sells the top-of-stack filled buy.
    ///
    /// Realized profit is `(exec - original exec) × quantity × multiplier`
    /// once the fill is confirmed, here or in a later reconcile.
    ///
    /// # Errors
    /// [`EngineError::NoOpenPosition`] when the top of the stack is not a
    /// filled buy; otherwise as [`PositionBook::submit_buy`].
    pub async fn submit_sell<T: TradeService>(
        &self,
        trade: &T,
        key: &PositionKey,
        kind: OrderKind,
        limit_price: Option<Decimal>,
        settle: Duration,
    ) -> Result<OrderRecord, EngineError> {
        let stack = self.stack(key);
        let mut guard = stack.lock().await;
        self.resolve_top(trade, &mut guard).await?;

        let open = guard
            .last()
            .filter(|r| r.side == OrderSide::Buy && r.status == OrderState::Filled)
            .cloned()
            .ok_or_else(|| EngineError::NoOpenPosition {
                ticker: key.ticker.clone(),
                option_type: key.option_type,
            })?;

        let submission = OrderSubmission {
            symbol: open.symbol.clone(),
            side: OrderSide::Sell,
            kind,
            quantity: open.quantity,
            limit_price,
        };
        let order_id = trade.submit_order(&submission).await?;
        tokio::time::sleep(settle).await;

        let mut record = OrderRecord {
            id: order_id.clone(),
            symbol: open.symbol.clone(),
            name: open.name.clone(),
            side: OrderSide::Sell,
            status: OrderState::Submitted,
            quantity: open.quantity,
            executed_price: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            profit: Decimal::ZERO,
            submitted_at: None,
        };
        match trade.order_detail(&order_id).await {
            Ok(detail) => {
                record.status = detail.status;
                record.quantity = detail.quantity;
                record.submitted_at = Some(detail.submitted_at);
                if detail.status == OrderState::Filled {
                    record.executed_price = detail.executed_price;
                    record.profit = (detail.executed_price - open.executed_price)
                        * Decimal::from(detail.quantity)
                        * self.multiplier;
                }
            }
            Err(err) => {
                warn!("order detail unavailable after submit of {order_id}: {err}");
            }
        }

        info!(
            "sell {} submitted for {}/{}: {}",
            order_id, key.ticker, key.option_type, record.status
        );
        guard.push(record.clone());
        Ok(record)
    }

    /// Reconciles the top of the stack against the broker and returns the
    /// current open position, if any.
    ///
    /// # Errors
    /// Transient broker faults propagate without touching the stack.
    pub async fn reconcile<T: TradeService>(
        &self,
        trade: &T,
        key: &PositionKey,
    ) -> Result<Option<OrderRecord>, EngineError> {
        let stack = self.stack(key);
        let mut guard = stack.lock().await;
        self.resolve_top(trade, &mut guard).await?;
        Ok(guard
            .last()
            .filter(|r| r.side == OrderSide::Buy && r.status == OrderState::Filled)
            .cloned())
    }

    /// Applies the broker's authoritative status to a non-settled top record:
    /// fills update in place (with derived cost or profit), canceled and
    /// rejected tops are popped entirely.
    async fn resolve_top<T: TradeService>(
        &self,
        trade: &T,
        stack: &mut Vec<OrderRecord>,
    ) -> Result<(), EngineError> {
        let Some(last) = stack.last() else {
            return Ok(());
        };
        match last.status {
            OrderState::Filled => return Ok(()),
            OrderState::Canceled | OrderState::Rejected => {
                stack.pop();
                return Ok(());
            }
            OrderState::Submitted => {}
        }

        let detail = trade.order_detail(&last.id).await?;
        match detail.status {
            OrderState::Filled => {
                let idx = stack.len() - 1;
                let quantity = Decimal::from(stack[idx].quantity);
                let exec = detail.executed_price;
                let prev_exec = stack[..idx]
                    .iter()
                    .rev()
                    .find(|r| r.side == OrderSide::Buy && r.status == OrderState::Filled)
                    .map(|r| r.executed_price);

                let record = &mut stack[idx];
                record.status = OrderState::Filled;
                record.executed_price = exec;
                match record.side {
                    OrderSide::Buy => {
                        record.total_cost = exec * quantity * self.multiplier;
                    }
                    OrderSide::Sell => {
                        if let Some(prev) = prev_exec {
                            record.profit = (exec - prev) * quantity * self.multiplier;
                        }
                    }
                }
                info!("order {} fill reconciled", record.id);
            }
            OrderState::Canceled | OrderState::Rejected => {
                if let Some(popped) = stack.pop() {
                    info!("order {} {} at broker, popped", popped.id, detail.status);
                }
            }
            OrderState::Submitted => {}
        }
        Ok(())
    }
}

/// Queries the maximum purchasable quantity for one candidate under a
/// sizing policy.
///
/// Returns `Ok(None)` when the instrument cannot be sized (not tradable, or
/// the policy yields zero contracts); the caller advances to the next
/// candidate.
///
/// # Errors
/// Transient trade-service faults propagate.
pub async fn size_candidate<T: TradeService>(
    trade: &T,
    symbol: &str,
    sizing: SizingPolicy,
) -> Result<Option<u64>, EngineError> {
    let estimate = match trade
        .estimate_max_purchase_quantity(symbol, OrderSide::Buy)
        .await
    {
        Ok(estimate) => estimate,
        Err(TradeError::NotTradable(_) | TradeError::Rejected(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let quantity = match sizing {
        SizingPolicy::Minimal => u64::from(estimate.cash_max >= 1),
        SizingPolicy::CashMax => estimate.cash_max,
        SizingPolicy::MarginMax => estimate.margin_max,
        SizingPolicy::Exact(n) => n.min(estimate.cash_max),
    };
    Ok((quantity > 0).then_some(quantity))
}
