//! Reference-counted screen interest → upstream subscription set.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::shared::{normalize_coin_ids, CoinId, ScreenId};
use crate::ws::MessageOut;

/// Coins that entered or left the upstream set as the result of one registry call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestDelta {
    pub gained: Vec<CoinId>,
    pub lost: Vec<CoinId>,
}

impl InterestDelta {
    pub fn is_empty(&self) -> bool {
        self.gained.is_empty() && self.lost.is_empty()
    }
}

#[derive(Default)]
struct Interest {
    entries: HashMap<ScreenId, HashSet<CoinId>>,
    /// Derived from `entries`; rebuilt after every mutation.
    counts: HashMap<CoinId, usize>,
    /// Whether a live connection is draining the outbound queue.
    forwarding: bool,
}

impl Interest {
    fn recount(&mut self) -> HashMap<CoinId, usize> {
        let mut counts: HashMap<CoinId, usize> = HashMap::new();
        for coin_id in self.entries.values().flatten() {
            *counts.entry(coin_id.clone()).or_default() += 1;
        }
        std::mem::replace(&mut self.counts, counts)
    }

    fn delta_from(&self, before: &HashMap<CoinId, usize>) -> InterestDelta {
        InterestDelta {
            gained: normalize_coin_ids(
                self.counts.keys().filter(|c| !before.contains_key(*c)).cloned(),
            ),
            lost: normalize_coin_ids(
                before.keys().filter(|c| !self.counts.contains_key(*c)).cloned(),
            ),
        }
    }
}

/// Maps each screen to the coins it watches and derives the upstream subscription set.
///
/// A coin is upstream exactly while at least one screen's entry contains it. Every
/// mutation recomputes the counts and enqueues the resulting subscribe/unsubscribe
/// frames inside the same critical section, so the outbound queue observes deltas
/// in mutation order.
///
/// Frames are only enqueued while forwarding is on. Offline changes are carried by
/// the upstream set that the next connection subscribes in one batch.
pub struct SubscriptionRegistry {
    interest: Mutex<Interest>,
    outbound: Option<mpsc::UnboundedSender<MessageOut>>,
}

impl SubscriptionRegistry {
    /// Registry that enqueues upstream deltas on `outbound`.
    pub fn new(outbound: mpsc::UnboundedSender<MessageOut>) -> Self {
        Self {
            interest: Mutex::new(Interest::default()),
            outbound: Some(outbound),
        }
    }

    /// Registry with no upstream; deltas are computed and returned only.
    pub fn detached() -> Self {
        Self {
            interest: Mutex::new(Interest::default()),
            outbound: None,
        }
    }

    /// Replace the screen's watched set.
    ///
    /// Coins the screen previously watched but no longer lists are released. An
    /// empty set is equivalent to [`unsubscribe_screen`](Self::unsubscribe_screen).
    pub fn subscribe_screen<I>(&self, screen_id: ScreenId, coin_ids: I) -> InterestDelta
    where
        I: IntoIterator<Item = CoinId>,
    {
        let coins: HashSet<CoinId> = coin_ids.into_iter().collect();
        let mut interest = self.interest.lock();

        if interest.entries.get(&screen_id) == Some(&coins) {
            tracing::debug!("Screen {} re-subscribed with an identical set", screen_id);
            return InterestDelta::default();
        }

        tracing::debug!("Screen {} now watches {} coin(s)", screen_id, coins.len());
        if coins.is_empty() {
            interest.entries.remove(&screen_id);
        } else {
            interest.entries.insert(screen_id, coins);
        }
        let before = interest.recount();
        let delta = interest.delta_from(&before);
        if interest.forwarding {
            self.enqueue(&delta);
        }
        delta
    }

    /// Release the screen's entry. Unknown screens are a no-op.
    pub fn unsubscribe_screen(&self, screen_id: &ScreenId) -> InterestDelta {
        let mut interest = self.interest.lock();
        if interest.entries.remove(screen_id).is_none() {
            tracing::debug!("Unsubscribe for unknown screen {}", screen_id);
            return InterestDelta::default();
        }

        tracing::debug!("Screen {} released its coins", screen_id);
        let before = interest.recount();
        let delta = interest.delta_from(&before);
        if interest.forwarding {
            self.enqueue(&delta);
        }
        delta
    }

    /// Turn delta forwarding on or off. Serialized with every mutation.
    pub(crate) fn set_forwarding(&self, on: bool) {
        self.interest.lock().forwarding = on;
    }

    fn enqueue(&self, delta: &InterestDelta) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        if !delta.gained.is_empty() {
            let _ = outbound.send(MessageOut::subscribe(delta.gained.iter().cloned()));
        }
        if !delta.lost.is_empty() {
            let _ = outbound.send(MessageOut::unsubscribe(delta.lost.iter().cloned()));
        }
    }

    /// Current upstream set, sorted.
    pub fn upstream_set(&self) -> Vec<CoinId> {
        let interest = self.interest.lock();
        interest
            .counts
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn interest_count(&self, coin_id: &CoinId) -> usize {
        self.interest.lock().counts.get(coin_id).copied().unwrap_or(0)
    }

    pub fn screen_count(&self) -> usize {
        self.interest.lock().entries.len()
    }

    pub fn coins_for(&self, screen_id: &ScreenId) -> Vec<CoinId> {
        let interest = self.interest.lock();
        interest
            .entries
            .get(screen_id)
            .map(|coins| normalize_coin_ids(coins.iter().cloned()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(ids: &[&str]) -> Vec<CoinId> {
        ids.iter().map(|s| CoinId::from(*s)).collect()
    }

    #[test]
    fn test_two_screens_share_a_coin() {
        let registry = SubscriptionRegistry::detached();
        let a = ScreenId::from("A");
        let b = ScreenId::from("B");

        let delta = registry.subscribe_screen(a.clone(), coins(&["BTC", "ETH"]));
        assert_eq!(delta.gained, coins(&["BTC", "ETH"]));

        let delta = registry.subscribe_screen(b.clone(), coins(&["ETH", "SOL"]));
        assert_eq!(delta.gained, coins(&["SOL"]));
        assert_eq!(registry.upstream_set(), coins(&["BTC", "ETH", "SOL"]));
        assert_eq!(registry.interest_count(&CoinId::from("ETH")), 2);

        let delta = registry.unsubscribe_screen(&a);
        assert_eq!(delta.lost, coins(&["BTC"]));
        assert!(delta.gained.is_empty());
        assert_eq!(registry.upstream_set(), coins(&["ETH", "SOL"]));
        assert_eq!(registry.interest_count(&CoinId::from("ETH")), 1);
        assert_eq!(registry.interest_count(&CoinId::from("BTC")), 0);
    }

    #[test]
    fn test_resubscribe_replaces_entry() {
        let registry = SubscriptionRegistry::detached();
        let a = ScreenId::from("A");
        registry.subscribe_screen(a.clone(), coins(&["BTC", "ETH"]));

        let delta = registry.subscribe_screen(a.clone(), coins(&["ETH", "SOL"]));
        assert_eq!(delta.gained, coins(&["SOL"]));
        assert_eq!(delta.lost, coins(&["BTC"]));
        assert_eq!(registry.coins_for(&a), coins(&["ETH", "SOL"]));
        assert_eq!(registry.screen_count(), 1);
    }

    #[test]
    fn test_identical_resubscribe_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(tx);
        registry.set_forwarding(true);
        let a = ScreenId::from("A");

        registry.subscribe_screen(a.clone(), coins(&["BTC"]));
        assert!(rx.try_recv().is_ok());

        let delta = registry.subscribe_screen(a, coins(&["BTC", "BTC"]));
        assert!(delta.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_screen_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(tx);
        registry.set_forwarding(true);
        assert!(registry.unsubscribe_screen(&ScreenId::from("ghost")).is_empty());
        assert!(rx.try_recv().is_err());

        registry.subscribe_screen(ScreenId::from("A"), coins(&["BTC"]));
        let _ = rx.try_recv();
        registry.unsubscribe_screen(&ScreenId::from("A"));
        registry.unsubscribe_screen(&ScreenId::from("A"));
        assert_eq!(rx.try_recv().unwrap(), MessageOut::unsubscribe(coins(&["BTC"])));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_offline_churn_enqueues_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(tx);

        for i in 0..100 {
            registry.subscribe_screen(ScreenId::from("list"), vec![CoinId::new(format!("coin{i}"))]);
        }
        registry.unsubscribe_screen(&ScreenId::from("list"));
        registry.subscribe_screen(ScreenId::from("A"), coins(&["BTC"]));
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.upstream_set(), coins(&["BTC"]));

        registry.set_forwarding(true);
        registry.subscribe_screen(ScreenId::from("B"), coins(&["ETH"]));
        assert_eq!(rx.try_recv().unwrap(), MessageOut::subscribe(coins(&["ETH"])));

        registry.set_forwarding(false);
        registry.unsubscribe_screen(&ScreenId::from("B"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_set_releases_screen() {
        let registry = SubscriptionRegistry::detached();
        let a = ScreenId::from("A");
        registry.subscribe_screen(a.clone(), coins(&["BTC"]));

        let delta = registry.subscribe_screen(a, Vec::new());
        assert_eq!(delta.lost, coins(&["BTC"]));
        assert_eq!(registry.screen_count(), 0);
        assert!(registry.upstream_set().is_empty());
    }

    #[test]
    fn test_outbound_frames_in_mutation_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new(tx);
        registry.set_forwarding(true);

        registry.subscribe_screen(ScreenId::from("A"), coins(&["BTC", "ETH"]));
        registry.subscribe_screen(ScreenId::from("B"), coins(&["ETH", "SOL"]));
        registry.unsubscribe_screen(&ScreenId::from("A"));

        assert_eq!(rx.try_recv().unwrap(), MessageOut::subscribe(coins(&["BTC", "ETH"])));
        assert_eq!(rx.try_recv().unwrap(), MessageOut::subscribe(coins(&["SOL"])));
        assert_eq!(rx.try_recv().unwrap(), MessageOut::unsubscribe(coins(&["BTC"])));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_upstream_equals_union_under_concurrency() {
        let registry = std::sync::Arc::new(SubscriptionRegistry::detached());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    let screen = ScreenId::new(format!("screen{n}"));
                    for i in 0..200 {
                        let set = vec![
                            CoinId::new(format!("coin{}", i % 5)),
                            CoinId::new(format!("coin{}", (i + n) % 7)),
                        ];
                        registry.subscribe_screen(screen.clone(), set);
                        if i % 3 == 0 {
                            registry.unsubscribe_screen(&screen);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut union = BTreeSet::new();
        for n in 0..8 {
            union.extend(registry.coins_for(&ScreenId::new(format!("screen{n}"))));
        }
        assert_eq!(registry.upstream_set(), union.into_iter().collect::<Vec<_>>());
    }
}
