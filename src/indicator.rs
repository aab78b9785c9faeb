//! Per-ticker streaming indicator state.
//!
//! Each configured ticker owns a fixed-capacity window of normalized price
//! deltas, held as exact decimals so thousands of updates never accumulate
//! float rounding error. Ticks mutate the window in arrival order; snapshot
//! reads are lock-brief and side-effect free.
//!
//! The resistance oscillator measures momentum exhaustion: it grows by the
//! size of each directional reversal and decays exponentially on sustained
//! moves, clamped to `[0, 30]`.

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Upper clamp of the resistance oscillator.
const RESISTANCE_CAP: Decimal = dec!(30.0);

/// Decay constant of the resistance oscillator.
const DECAY: Decimal = dec!(2.0);

/// Mutable per-ticker state, owned by the registry.
#[derive(Debug)]
struct IndicatorState {
    /// Window of normalized deltas, oldest first, always `memory` long.
    window: VecDeque<Decimal>,
    /// Previous and current cumulative session volume.
    volume_pair: [u64; 2],
    resistance: Decimal,
    momentum: Decimal,
    local_max: bool,
    local_min: bool,
    /// Session reference close, fixed at registration.
    reference_close: Decimal,
}

impl IndicatorState {
    fn new(memory: usize, reference_close: Decimal) -> Self {
        Self {
            window: VecDeque::from(vec![Decimal::ZERO; memory]),
            volume_pair: [0, 0],
            resistance: Decimal::ZERO,
            momentum: Decimal::ZERO,
            local_max: false,
            local_min: false,
            reference_close,
        }
    }
}

/// Read-only view of one ticker's indicators.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    /// Ticker the snapshot belongs to.
    pub ticker: String,
    /// Latest normalized delta (last price minus reference close, 3 dp).
    pub delta: Decimal,
    /// Three-newest minus three-oldest window mean (2 dp).
    pub momentum: Decimal,
    /// Resistance oscillator, in `[0, 30]`.
    pub resistance: Decimal,
    /// Volume traded since the previous tick.
    pub volume_delta: u64,
    /// Latest delta exceeded every value in the prior window.
    pub is_local_max: bool,
    /// Latest delta undercut every value in the prior window.
    pub is_local_min: bool,
}

/// Registry of per-ticker indicator state.
///
/// One entry per configured ticker, created at bootstrap and never removed
/// while the process runs. Each entry carries its own lock, so ticks for
/// unrelated tickers proceed in parallel while updates to one ticker apply
/// in arrival order.
pub struct IndicatorEngine {
    states: DashMap<String, Arc<Mutex<IndicatorState>>>,
    memory: usize,
}

impl IndicatorEngine {
    /// Creates an empty registry with the given window length.
    ///
    /// `memory` must be at least 3 (enforced at config load): the update
    /// rule reads the two most recent window values and the momentum term
    /// averages three.
    #[must_use]
    pub fn new(memory: usize) -> Self {
        Self {
            states: DashMap::new(),
            memory,
        }
    }

    /// Registers a ticker with its session reference close.
    ///
    /// The window starts as all-zero deltas, so the first `memory` ticks
    /// compare against synthetic zeros (warm-up bias, kept deliberately for
    /// reproducibility).
    pub fn register(&self, ticker: &str, reference_close: Decimal) {
        self.states.insert(
            ticker.to_string(),
            Arc::new(Mutex::new(IndicatorState::new(self.memory, reference_close))),
        );
    }

    /// Whether the ticker is registered.
    #[must_use]
    pub fn contains(&self, ticker: &str) -> bool {
        self.states.contains_key(ticker)
    }

    /// Consumes one tick. The only mutator of indicator state.
    ///
    /// Ticks for unregistered tickers are dropped.
    pub fn on_tick(&self, ticker: &str, last_done: Decimal, cumulative_volume: u64) {
        let Some(state) = self.states.get(ticker).map(|e| Arc::clone(e.value())) else {
            debug!(ticker, "tick for unregistered ticker dropped");
            return;
        };
        let mut s = state.lock();

        let delta = (last_done - s.reference_close).round_dp(3);
        let len = s.window.len();
        let d1 = delta - s.window[len - 1];
        let d2 = s.window[len - 1] - s.window[len - 2];

        s.volume_pair[0] = s.volume_pair[1];
        s.volume_pair[1] = cumulative_volume;

        // Extremes are judged against the window as it was before this push.
        let prior_max = s.window.iter().copied().max().unwrap_or(Decimal::ZERO);
        let prior_min = s.window.iter().copied().min().unwrap_or(Decimal::ZERO);
        s.local_max = delta > prior_max;
        s.local_min = delta < prior_min;

        s.window.push_back(delta);
        s.window.pop_front();

        let newest: Decimal = s.window.iter().rev().take(3).copied().sum();
        let oldest: Decimal = s.window.iter().take(3).copied().sum();
        s.momentum = (newest / dec!(3.0) - oldest / dec!(3.0)).round_dp(2);

        if d1 * d2 <= Decimal::ZERO {
            // Reversal or flat: resistance builds by the reversal size.
            s.resistance = (s.resistance + d1.abs()).min(RESISTANCE_CAP);
        } else {
            // Continuation: decay, faster for larger moves.
            s.resistance = s.resistance * DECAY / (d1.abs() + DECAY);
        }
    }

    /// Read-only snapshot of one ticker's indicators.
    #[must_use]
    pub fn snapshot(&self, ticker: &str) -> Option<IndicatorSnapshot> {
        let state = self.states.get(ticker).map(|e| Arc::clone(e.value()))?;
        let s = state.lock();
        Some(IndicatorSnapshot {
            ticker: ticker.to_string(),
            delta: s.window.back().copied().unwrap_or(Decimal::ZERO),
            momentum: s.momentum,
            resistance: s.resistance,
            volume_delta: s.volume_pair[1].saturating_sub(s.volume_pair[0]),
            is_local_max: s.local_max,
            is_local_min: s.local_min,
        })
    }
}
