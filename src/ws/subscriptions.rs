//! Subscription frame parameters and live-subscription tracking.

use crate::shared::{normalize_coin_ids, CoinId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Parameters for subscribing to price ticks for a set of coins.
///
/// Coin ids are kept sorted and unique so two params naming the same set compare equal
/// and serialize identically.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct SubscribeParams {
    pub coin_ids: Vec<CoinId>,
}

/// Parameters for unsubscribing from price ticks for a set of coins.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct UnsubscribeParams {
    pub coin_ids: Vec<CoinId>,
}

impl SubscribeParams {
    pub fn new<I: IntoIterator<Item = CoinId>>(coin_ids: I) -> Self {
        Self {
            coin_ids: normalize_coin_ids(coin_ids),
        }
    }
}

impl UnsubscribeParams {
    pub fn new<I: IntoIterator<Item = CoinId>>(coin_ids: I) -> Self {
        Self {
            coin_ids: normalize_coin_ids(coin_ids),
        }
    }
}

// ─── Live subscription tracking ─────────────────────────────────────────────

/// Coins actually subscribed on the current physical connection.
///
/// Incremental frames are filtered through this set, so a delta that races with the
/// connect-time batch never produces a duplicate subscribe or a dangling unsubscribe.
#[derive(Debug, Default)]
pub struct LiveSubscriptions {
    coins: HashSet<CoinId>,
}

impl LiveSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked set with what the connect-time batch subscribed.
    pub fn reset<I: IntoIterator<Item = CoinId>>(&mut self, coin_ids: I) {
        self.coins = coin_ids.into_iter().collect();
    }

    /// Track a subscribe; returns the params for the coins that were not live yet.
    pub fn track_subscribe(&mut self, params: &SubscribeParams) -> Option<SubscribeParams> {
        let fresh: Vec<CoinId> = params
            .coin_ids
            .iter()
            .filter(|id| self.coins.insert((*id).clone()))
            .cloned()
            .collect();
        if fresh.is_empty() {
            None
        } else {
            tracing::debug!("Tracking {} new coin subscription(s)", fresh.len());
            Some(SubscribeParams::new(fresh))
        }
    }

    /// Track an unsubscribe; returns the params for the coins that were live.
    pub fn track_unsubscribe(&mut self, params: &UnsubscribeParams) -> Option<UnsubscribeParams> {
        let live: Vec<CoinId> = params
            .coin_ids
            .iter()
            .filter(|id| self.coins.remove(*id))
            .cloned()
            .collect();
        if live.is_empty() {
            None
        } else {
            tracing::debug!("Removed {} coin subscription(s) from tracking", live.len());
            Some(UnsubscribeParams::new(live))
        }
    }

    pub fn contains(&self, coin_id: &CoinId) -> bool {
        self.coins.contains(coin_id)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
