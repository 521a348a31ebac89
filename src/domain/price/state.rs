//! Last-price state for direction tracking — owned by the tick path.

use super::{PriceUpdate, Tick};
use crate::shared::CoinId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct LastPrice {
    price: Decimal,
    timestamp: DateTime<Utc>,
    /// Session the price was observed in.
    session: u64,
}

type Slot = Arc<Mutex<Option<LastPrice>>>;

/// Per-coin last-price cache that turns bare ticks into [`PriceUpdate`]s.
///
/// Each coin has its own slot; annotating one coin never waits on another coin's
/// slot. Entries are created on the first tick and never removed, so the map is
/// bounded by the coin universe.
///
/// Prices survive across feed sessions so direction stays continuous over a
/// reconnect, but only prices observed in the current session count as live.
#[derive(Debug, Default)]
pub struct PriceDirectionTracker {
    slots: DashMap<CoinId, Slot>,
    session: AtomicU64,
}

impl PriceDirectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new feed session. Prices seen before this call stop being live.
    pub fn begin_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    fn slot(&self, coin_id: &CoinId) -> Slot {
        if let Some(slot) = self.slots.get(coin_id) {
            return slot.clone();
        }
        self.slots.entry(coin_id.clone()).or_default().clone()
    }

    /// Annotate a tick against the cached price and store it as the new last price.
    ///
    /// The first tick for a coin is its own baseline: `Unchanged`, 0%.
    pub fn annotate(
        &self,
        coin_id: &CoinId,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> PriceUpdate {
        let slot = self.slot(coin_id);
        let mut last = slot.lock();
        let previous_price = last.map(|l| l.price).unwrap_or(price);
        *last = Some(LastPrice {
            price,
            timestamp,
            session: self.current_session(),
        });
        PriceUpdate::new(coin_id.clone(), price, previous_price, timestamp)
    }

    /// Like [`annotate`](Self::annotate), but drops ticks older than the cached one.
    ///
    /// Guards against a tick still in flight on a dropped connection landing after a
    /// reconnect already delivered a fresher value. Equal timestamps are accepted.
    pub fn annotate_if_newer(&self, tick: &Tick) -> Option<PriceUpdate> {
        let slot = self.slot(&tick.coin_id);
        let mut last = slot.lock();
        let previous_price = match *last {
            Some(prev) if tick.timestamp < prev.timestamp => {
                tracing::debug!(
                    "Dropping stale tick for {}: {} < {}",
                    tick.coin_id,
                    tick.timestamp,
                    prev.timestamp
                );
                return None;
            }
            Some(prev) => prev.price,
            None => tick.price,
        };
        *last = Some(LastPrice {
            price: tick.price,
            timestamp: tick.timestamp,
            session: self.current_session(),
        });
        Some(PriceUpdate::new(
            tick.coin_id.clone(),
            tick.price,
            previous_price,
            tick.timestamp,
        ))
    }

    pub fn last_price(&self, coin_id: &CoinId) -> Option<Decimal> {
        let slot = self.slots.get(coin_id)?.clone();
        let last = slot.lock();
        last.map(|l| l.price)
    }

    /// Last price observed in the current session, if any.
    pub fn live_price(&self, coin_id: &CoinId) -> Option<Decimal> {
        let slot = self.slots.get(coin_id)?.clone();
        let last = slot.lock();
        let session = self.current_session();
        last.filter(|l| l.session == session).map(|l| l.price)
    }

    /// Number of coins with at least one observed tick.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::Direction;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn tick(coin: &str, price: i64, ms: i64) -> Tick {
        Tick {
            coin_id: CoinId::from(coin),
            price: Decimal::from(price),
            timestamp: ts(ms),
        }
    }

    #[test]
    fn test_first_tick_is_unchanged_then_up() {
        let tracker = PriceDirectionTracker::new();
        let btc = CoinId::from("bitcoin");

        let first = tracker.annotate(&btc, Decimal::from(100), ts(1_000));
        assert_eq!(first.direction, Direction::Unchanged);
        assert_eq!(first.change_percent, Decimal::ZERO);
        assert_eq!(first.previous_price, Decimal::from(100));

        let second = tracker.annotate(&btc, Decimal::from(110), ts(2_000));
        assert_eq!(second.direction, Direction::Up);
        assert_eq!(second.change_percent, Decimal::from(10));
        assert_eq!(second.previous_price, Decimal::from(100));
        assert_eq!(tracker.last_price(&btc), Some(Decimal::from(110)));
    }

    #[test]
    fn test_coins_are_tracked_independently() {
        let tracker = PriceDirectionTracker::new();
        tracker.annotate_if_newer(&tick("bitcoin", 100, 1));
        let eth = tracker.annotate_if_newer(&tick("ethereum", 50, 2)).unwrap();
        assert_eq!(eth.direction, Direction::Unchanged);

        let btc = tracker.annotate_if_newer(&tick("bitcoin", 90, 3)).unwrap();
        assert_eq!(btc.direction, Direction::Down);
        assert_eq!(btc.change_percent, Decimal::from(-10));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_stale_tick_is_dropped() {
        let tracker = PriceDirectionTracker::new();
        tracker.annotate_if_newer(&tick("bitcoin", 100, 2_000)).unwrap();

        assert!(tracker.annotate_if_newer(&tick("bitcoin", 95, 1_000)).is_none());
        assert_eq!(tracker.last_price(&CoinId::from("bitcoin")), Some(Decimal::from(100)));
    }

    #[test]
    fn test_equal_timestamp_is_accepted() {
        let tracker = PriceDirectionTracker::new();
        tracker.annotate_if_newer(&tick("bitcoin", 100, 2_000)).unwrap();
        let update = tracker.annotate_if_newer(&tick("bitcoin", 101, 2_000)).unwrap();
        assert_eq!(update.direction, Direction::Up);
    }

    #[test]
    fn test_new_session_clears_live_but_keeps_baseline() {
        let tracker = PriceDirectionTracker::new();
        let btc = CoinId::from("bitcoin");
        tracker.begin_session();
        tracker.annotate_if_newer(&tick("bitcoin", 100, 1_000)).unwrap();
        assert_eq!(tracker.live_price(&btc), Some(Decimal::from(100)));

        tracker.begin_session();
        assert_eq!(tracker.live_price(&btc), None);
        assert_eq!(tracker.last_price(&btc), Some(Decimal::from(100)));

        let update = tracker.annotate_if_newer(&tick("bitcoin", 110, 2_000)).unwrap();
        assert_eq!(update.direction, Direction::Up);
        assert_eq!(tracker.live_price(&btc), Some(Decimal::from(110)));
    }

    #[test]
    fn test_last_price_unknown_coin() {
        let tracker = PriceDirectionTracker::new();
        assert!(tracker.last_price(&CoinId::from("nope")).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_concurrent_coins_keep_per_coin_order() {
        let tracker = Arc::new(PriceDirectionTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let coin = CoinId::new(format!("coin{n}"));
                    for i in 1..=500i64 {
                        let update = tracker.annotate(&coin, Decimal::from(i), ts(i));
                        if i > 1 {
                            assert_eq!(update.previous_price, Decimal::from(i - 1));
                            assert_eq!(update.direction, Direction::Up);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(), 8);
        assert_eq!(tracker.last_price(&CoinId::from("coin3")), Some(Decimal::from(500)));
    }
}
