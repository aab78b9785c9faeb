//! Trade-service boundary: the interface to the external broker.

use crate::orders::{OrderKind, OrderSide, OrderState};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trade service failure.
///
/// `NotTradable` is recoverable during candidate selection (skip to the next
/// contract); the other variants are surfaced to the caller for retry.
#[derive(Debug, Clone, Error)]
pub enum TradeError {
    /// The instrument cannot be sized or traded by this account.
    #[error("instrument not tradable: {0}")]
    NotTradable(String),
    /// The broker does not know the order id.
    #[error("unknown order: {0}")]
    UnknownOrder(String),
    /// The broker refused the request outright.
    #[error("request rejected by broker: {0}")]
    Rejected(String),
    /// Transient connectivity or rate-limit fault.
    #[error("trade service unavailable: {0}")]
    Unavailable(String),
}

/// A fully resolved order ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmission {
    /// Exchange-qualified contract symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market or limit.
    pub kind: OrderKind,
    /// Contracts to trade.
    pub quantity: u64,
    /// Limit price; `None` for market orders.
    pub limit_price: Option<Decimal>,
}

/// Authoritative order state as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Broker-assigned order id.
    pub order_id: String,
    /// Exchange-qualified contract symbol.
    pub symbol: String,
    /// Venue display name of the instrument.
    pub stock_name: String,
    /// Current lifecycle state.
    pub status: OrderState,
    /// Executed price; zero until filled.
    pub executed_price: Decimal,
    /// Order quantity.
    pub quantity: u64,
    /// Submission timestamp at the venue.
    pub submitted_at: DateTime<Utc>,
}

/// Maximum purchasable quantity estimate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurchaseEstimate {
    /// Contracts affordable with settled cash.
    pub cash_max: u64,
    /// Contracts affordable on margin.
    pub margin_max: u64,
}

/// One open position as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLine {
    /// Exchange-qualified symbol.
    pub symbol: String,
    /// Venue display name of the instrument.
    pub symbol_name: String,
    /// Average cost price.
    pub cost_price: Decimal,
    /// Held quantity.
    pub quantity: u64,
}

/// Order submission and account interface.
#[allow(async_fn_in_trait)]
pub trait TradeService: Send + Sync {
    /// Submits an order, returning the broker-assigned order id.
    async fn submit_order(&self, order: &OrderSubmission) -> Result<String, TradeError>;

    /// Fetches the authoritative state of an order.
    async fn order_detail(&self, order_id: &str) -> Result<OrderDetail, TradeError>;

    /// Requests cancellation of an open order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradeError>;

    /// Amends quantity and/or price of an open order.
    async fn replace_order(
        &self,
        order_id: &str,
        quantity: u64,
        price: Option<Decimal>,
    ) -> Result<(), TradeError>;

    /// Estimates how many contracts the account could buy.
    ///
    /// Fails with [`TradeError::NotTradable`] for instruments the account
    /// cannot trade; callers treat that as "try the next candidate".
    async fn estimate_max_purchase_quantity(
        &self,
        symbol: &str,
        side: OrderSide,
    ) -> Result<PurchaseEstimate, TradeError>;

    /// Lists currently held positions.
    async fn positions(&self) -> Result<Vec<PositionLine>, TradeError>;
}
