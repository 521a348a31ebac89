//! Cached price store collaborator — read by the offline fallback policy.

use crate::shared::CoinId;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Read interface onto the app's persisted price cache.
///
/// The engine only ever reads through this trait; writes belong to the app's
/// persistence layer.
pub trait PriceCache: Send + Sync {
    fn get(&self, coin_id: &CoinId) -> Option<Decimal>;
}

/// Simple in-memory [`PriceCache`], for tests and apps without persistence.
#[derive(Debug, Default)]
pub struct InMemoryPriceCache {
    prices: RwLock<HashMap<CoinId, Decimal>>,
}

impl InMemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, coin_id: CoinId, price: Decimal) {
        self.prices.write().insert(coin_id, price);
    }

    pub fn remove(&self, coin_id: &CoinId) {
        self.prices.write().remove(coin_id);
    }

    pub fn clear(&self) {
        self.prices.write().clear();
    }
}

impl<I> From<I> for InMemoryPriceCache
where
    I: IntoIterator<Item = (CoinId, Decimal)>,
{
    fn from(entries: I) -> Self {
        Self {
            prices: RwLock::new(entries.into_iter().collect()),
        }
    }
}

impl PriceCache for InMemoryPriceCache {
    fn get(&self, coin_id: &CoinId) -> Option<Decimal> {
        self.prices.read().get(coin_id).copied()
    }
}

/// A cache with nothing in it; the default when the app supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPriceCache;

impl PriceCache for NoPriceCache {
    fn get(&self, _coin_id: &CoinId) -> Option<Decimal> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let cache = InMemoryPriceCache::new();
        let btc = CoinId::from("bitcoin");
        assert!(cache.get(&btc).is_none());

        cache.insert(btc.clone(), Decimal::from(64_000));
        assert_eq!(cache.get(&btc), Some(Decimal::from(64_000)));

        cache.remove(&btc);
        assert!(cache.get(&btc).is_none());
    }

    #[test]
    fn test_from_entries() {
        let cache = InMemoryPriceCache::from(vec![(CoinId::from("solana"), Decimal::from(150))]);
        assert_eq!(cache.get(&CoinId::from("solana")), Some(Decimal::from(150)));
        cache.clear();
        assert!(cache.get(&CoinId::from("solana")).is_none());
    }

    #[test]
    fn test_no_price_cache_is_empty() {
        assert!(NoPriceCache.get(&CoinId::from("bitcoin")).is_none());
    }
}
