//! # Longtrade Engine
//!
//! A real-time market-analytics and order-lifecycle engine for a small fixed
//! universe of tickers and their option chains. The crate ingests a push feed
//! of trade ticks, derives streaming per-ticker indicators, caches option-chain
//! structure and quotes, prices options with a closed-form model, and tracks
//! submitted orders against an external broker.
//!
//! ## Key Features
//!
//! - **Streaming Indicators**: Fixed-size sliding window of exact-decimal
//!   price deltas per ticker, with a bounded resistance oscillator, momentum,
//!   and local-extreme detection.
//!
//! - **Option Chain Cache**: Near-the-money contract windows located by binary
//!   search over the strike ladder, refreshed per request during trading hours
//!   and served from cache outside them.
//!
//! - **Closed-Form Pricing**: Option value, delta, vega, and per-day theta
//!   with strict domain validation.
//!
//! - **Order Lifecycle Tracking**: Per-(ticker, option-type) position stacks
//!   reconciled against asynchronously reported broker status, with exact
//!   fixed-point realized P&L.
//!
//! - **Thread-Safe State**: Per-key locking throughout, so unrelated tickers
//!   and positions never serialize on each other.
//!
//! ## Architecture
//!
//! The engine sits between an external quote feed and trade service (reached
//! through the [`feed`] and [`broker`] traits) and a transport layer that is
//! not part of this crate:
//!
//! ```text
//! quote feed ──push──▶ Engine::handle_quote ──▶ IndicatorEngine
//!            ──push──▶ ChainView::apply     ──▶ ChainCache entry
//! transport  ──call──▶ Engine queries/orders ─▶ PositionBook ──▶ trade service
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`broker`] | Trade-service boundary trait and order wire types |
//! | [`chain`] | Option-chain cache, near-the-money search, push routing |
//! | [`config`] | TOML configuration with validation |
//! | [`engine`] | Engine façade wiring all components |
//! | [`error`] | Engine-wide error type |
//! | [`factors`] | Capital-flow, volatility, and correlation analytics |
//! | [`feed`] | Quote-feed boundary trait and market data types |
//! | [`indicator`] | Per-ticker sliding-window indicator registry |
//! | [`orders`] | Order-lifecycle types and position stacks |
//! | [`pricing`] | Closed-form option valuation and greeks |
//! | [`subscription`] | Reference-counted feed subscription registry |
//! | [`symbol`] | Ticker normalization and the option-identifier codec |

pub mod broker;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod factors;
pub mod feed;
pub mod indicator;
pub mod orders;
pub mod pricing;
pub mod subscription;
pub mod symbol;

#[cfg(test)]
pub(crate) mod testkit;
