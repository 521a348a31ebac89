//! Fan-out of annotated price updates to observers.

use std::pin::Pin;

use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::domain::price::PriceUpdate;
use crate::shared::CoinId;

/// Boxed stream of price updates handed to observers.
pub type PriceUpdateStream = Pin<Box<dyn Stream<Item = PriceUpdate> + Send>>;

/// Broadcasts each update to the all-coins channel and to that coin's channel.
///
/// Every observer has its own bounded ring buffer. Publishing never waits: an
/// observer that falls behind loses its oldest buffered updates and keeps going.
/// Per-coin channels are created on first interest and dropped once their last
/// observer is gone.
pub struct UpdateDistributor {
    all: broadcast::Sender<PriceUpdate>,
    per_coin: DashMap<CoinId, broadcast::Sender<PriceUpdate>>,
    coin_capacity: usize,
}

impl UpdateDistributor {
    pub fn new(capacity: usize, coin_capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity.max(1));
        Self {
            all,
            per_coin: DashMap::new(),
            coin_capacity: coin_capacity.max(1),
        }
    }

    pub fn publish(&self, update: PriceUpdate) {
        let coin_id = update.coin_id.clone();
        let delivered = match self.per_coin.get(&coin_id) {
            Some(tx) => tx.send(update.clone()).is_ok(),
            None => true,
        };
        if !delivered {
            self.prune_idle(&coin_id);
        }
        // No receivers is not an error here.
        let _ = self.all.send(update);
    }

    /// Drop the coin's channel if nobody listens. An observer that subscribed
    /// since the failed send keeps it alive.
    fn prune_idle(&self, coin_id: &CoinId) -> bool {
        let pruned = self
            .per_coin
            .remove_if(coin_id, |_, tx| tx.receiver_count() == 0)
            .is_some();
        if pruned {
            tracing::debug!("Pruned idle update channel for {}", coin_id);
        }
        pruned
    }

    pub fn all_updates(&self) -> PriceUpdateStream {
        into_stream(self.all.subscribe(), None)
    }

    pub fn updates_for(&self, coin_id: &CoinId) -> PriceUpdateStream {
        let rx = self
            .per_coin
            .entry(coin_id.clone())
            .or_insert_with(|| broadcast::channel(self.coin_capacity).0)
            .subscribe();
        into_stream(rx, Some(coin_id.clone()))
    }

    /// Number of coins with a live per-coin channel.
    pub fn coin_channel_count(&self) -> usize {
        self.per_coin.len()
    }
}

fn into_stream(
    mut rx: broadcast::Receiver<PriceUpdate>,
    coin_id: Option<CoinId>,
) -> PriceUpdateStream {
    Box::pin(async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(update) => yield update,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Slow price observer{} skipped {} update(s)",
                        coin_id.as_ref().map(|c| format!(" for {c}")).unwrap_or_default(),
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
