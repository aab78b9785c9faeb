//! Reference-counted feed subscriptions.
//!
//! Several snapshot consumers can watch the same symbols at once; the venue
//! subscription is taken out when the first reference appears and released
//! when the last one goes away, so one client disconnecting never tears down
//! a stream another client still reads.

use crate::error::EngineError;
use crate::feed::{QuoteFeed, SubKind};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Reference counts per (symbol, kind).
#[derive(Default)]
pub struct SubscriptionRegistry {
    counts: Mutex<HashMap<(String, SubKind), usize>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one reference on each (symbol, kind); subscribes at the venue
    /// for pairs going from zero to one.
    ///
    /// # Errors
    /// Venue subscription failures; counts for the failed kind are not taken.
    pub async fn acquire<F: QuoteFeed>(
        &self,
        feed: &F,
        symbols: &[String],
        kinds: &[SubKind],
    ) -> Result<(), EngineError> {
        let mut counts = self.counts.lock().await;
        for &kind in kinds {
            let fresh: Vec<String> = symbols
                .iter()
                .filter(|s| !counts.contains_key(&((*s).clone(), kind)))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                feed.subscribe(&fresh, &[kind]).await?;
                debug!("subscribed {} fresh symbols for {:?}", fresh.len(), kind);
            }
            for s in symbols {
                *counts.entry((s.clone(), kind)).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    /// Drops one reference on each (symbol, kind); unsubscribes at the venue
    /// for pairs reaching zero.
    ///
    /// # Errors
    /// Venue unsubscription failures; counts are dropped regardless, so a
    /// retry will not double-release.
    pub async fn release<F: QuoteFeed>(
        &self,
        feed: &F,
        symbols: &[String],
        kinds: &[SubKind],
    ) -> Result<(), EngineError> {
        let mut counts = self.counts.lock().await;
        for &kind in kinds {
            let mut dead: Vec<String> = Vec::new();
            for s in symbols {
                let entry = counts.get_mut(&(s.clone(), kind));
                if let Some(count) = entry {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&(s.clone(), kind));
                        dead.push(s.clone());
                    }
                }
            }
            if !dead.is_empty() {
                feed.unsubscribe(&dead, &[kind]).await?;
                debug!("unsubscribed {} symbols for {:?}", dead.len(), kind);
            }
        }
        Ok(())
    }

    /// Number of live (symbol, kind) references, for monitoring.
    pub async fn live_count(&self) -> usize {
        self.counts.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockFeed;
    use rust_decimal_macros::dec;

    fn symbols() -> Vec<String> {
        vec!["AAPL.US".to_string(), "TSLA.US".to_string()]
    }

    #[tokio::test]
    async fn test_second_acquire_does_not_resubscribe() {
        let feed = MockFeed::with_default_chain("aapl", dec!(100));
        let registry = SubscriptionRegistry::new();

        registry.acquire(&feed, &symbols(), &[SubKind::Quote]).await.expect("first");
        registry.acquire(&feed, &symbols(), &[SubKind::Quote]).await.expect("second");

        assert_eq!(feed.subscribe_calls(), 1);
        assert_eq!(registry.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_release_of_shared_reference_keeps_subscription() {
        let feed = MockFeed::with_default_chain("aapl", dec!(100));
        let registry = SubscriptionRegistry::new();

        registry.acquire(&feed, &symbols(), &[SubKind::Quote]).await.expect("first");
        registry.acquire(&feed, &symbols(), &[SubKind::Quote]).await.expect("second");

        registry.release(&feed, &symbols(), &[SubKind::Quote]).await.expect("release");
        assert_eq!(feed.unsubscribe_calls(), 0);

        registry.release(&feed, &symbols(), &[SubKind::Quote]).await.expect("release");
        assert_eq!(feed.unsubscribe_calls(), 1);
        assert_eq!(registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_kinds_are_counted_independently() {
        let feed = MockFeed::with_default_chain("aapl", dec!(100));
        let registry = SubscriptionRegistry::new();

        registry
            .acquire(&feed, &symbols(), &[SubKind::Quote, SubKind::Depth])
            .await
            .expect("acquire");
        assert_eq!(feed.subscribe_calls(), 2);

        registry.release(&feed, &symbols(), &[SubKind::Depth]).await.expect("release");
        assert_eq!(feed.unsubscribe_calls(), 1);
        assert_eq!(registry.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_release_without_reference_is_a_no_op() {
        let feed = MockFeed::with_default_chain("aapl", dec!(100));
        let registry = SubscriptionRegistry::new();
        registry.release(&feed, &symbols(), &[SubKind::Quote]).await.expect("release");
        assert_eq!(feed.unsubscribe_calls(), 0);
    }
}
