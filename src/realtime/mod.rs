//! Real-time engine — `PriceEngine` and its components.
//!
//! Ticks flow socket → [`ConnectionSupervisor`] → [`PriceDirectionTracker`] →
//! [`UpdateDistributor`] → observer streams. Screens register interest through the
//! [`SubscriptionRegistry`]; the supervisor turns the registry's deltas into
//! upstream frames.

pub mod distributor;
pub mod fallback;
pub mod registry;
pub mod state;
pub mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::domain::price::cache::NoPriceCache;
use crate::domain::price::{PriceCache, PriceDirectionTracker};
use crate::error::{PriceDataError, SdkError};
use crate::shared::{CoinId, ScreenId};
use crate::ws::{Transport, WsConfig};

pub use distributor::{PriceUpdateStream, UpdateDistributor};
pub use fallback::PriceView;
pub use registry::{InterestDelta, SubscriptionRegistry};
pub use state::{ConnectionState, ConnectionStateStream};
pub use supervisor::ConnectionSupervisor;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ws: WsConfig,
    /// Per-observer buffer of the all-coins stream.
    pub update_buffer_capacity: usize,
    /// Per-observer buffer of each per-coin stream.
    pub coin_buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ws: WsConfig::default(),
            update_buffer_capacity: 1024,
            coin_buffer_capacity: 64,
        }
    }
}

struct EngineInner {
    supervisor: ConnectionSupervisor,
    registry: Arc<SubscriptionRegistry>,
    tracker: Arc<PriceDirectionTracker>,
    distributor: Arc<UpdateDistributor>,
    cache: Arc<dyn PriceCache>,
}

/// The price subscription and distribution engine.
///
/// Cheap to clone; clones share one connection and one registry. Construct one per
/// app and hand clones to screens.
#[derive(Clone)]
pub struct PriceEngine {
    inner: Arc<EngineInner>,
}

impl PriceEngine {
    pub fn builder() -> PriceEngineBuilder {
        PriceEngineBuilder::default()
    }

    // ── Connection ───────────────────────────────────────────────────────

    /// Start the feed connection. See [`ConnectionSupervisor::start`].
    pub async fn start(&self) -> ConnectionState {
        self.inner.supervisor.start().await
    }

    /// Stop the feed connection and publish `Disconnected`.
    pub async fn stop(&self) {
        self.inner.supervisor.stop().await
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.supervisor.current_state()
    }

    /// Every state transition, starting with the current state.
    pub fn connection_state(&self) -> ConnectionStateStream {
        self.inner.supervisor.state_stream()
    }

    // ── Screen interest ──────────────────────────────────────────────────

    /// Declare (or replace) the coins a screen is watching.
    pub fn subscribe_screen<I>(&self, screen_id: impl Into<ScreenId>, coin_ids: I) -> InterestDelta
    where
        I: IntoIterator<Item = CoinId>,
    {
        self.inner.registry.subscribe_screen(screen_id.into(), coin_ids)
    }

    /// Release a screen's interest. Idempotent.
    pub fn unsubscribe_screen(&self, screen_id: impl Into<ScreenId>) -> InterestDelta {
        self.inner.registry.unsubscribe_screen(&screen_id.into())
    }

    pub fn upstream_coins(&self) -> Vec<CoinId> {
        self.inner.registry.upstream_set()
    }

    pub fn interest_count(&self, coin_id: &CoinId) -> usize {
        self.inner.registry.interest_count(coin_id)
    }

    // ── Price data ───────────────────────────────────────────────────────

    pub fn all_price_updates(&self) -> PriceUpdateStream {
        self.inner.distributor.all_updates()
    }

    pub fn price_updates_for(&self, coin_id: &CoinId) -> PriceUpdateStream {
        self.inner.distributor.updates_for(coin_id)
    }

    /// Last price seen on the feed for `coin_id`, regardless of connection state.
    pub fn last_price(&self, coin_id: &CoinId) -> Option<Decimal> {
        self.inner.tracker.last_price(coin_id)
    }

    /// What a screen should display for `coin_id` right now.
    ///
    /// Only prices received on the current connection count as live.
    pub fn price_view(&self, coin_id: &CoinId) -> Result<PriceView, PriceDataError> {
        let connected = self.current_state().is_connected();
        let live = self.inner.tracker.live_price(coin_id);
        let cached = self.inner.cache.get(coin_id);
        fallback::resolve(coin_id, connected, live, cached)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct PriceEngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn PriceCache>>,
}

impl Default for PriceEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            transport: None,
            cache: None,
        }
    }
}

impl PriceEngineBuilder {
    pub fn ws_url(mut self, url: &str) -> Self {
        self.config.ws.url = url.to_string();
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.ws.backoff.max_attempts = attempts;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.ws.connect_timeout = timeout;
        self
    }

    /// Replace the whole configuration. Call before the narrower setters.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of the default `tokio-tungstenite` one.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Persisted price store consulted while offline.
    pub fn price_cache(mut self, cache: Arc<dyn PriceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<PriceEngine, SdkError> {
        if self.config.ws.url.is_empty() {
            return Err(SdkError::Validation("feed URL is empty".to_string()));
        }
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new(outbound_tx));
        let tracker = Arc::new(PriceDirectionTracker::new());
        let distributor = Arc::new(UpdateDistributor::new(
            self.config.update_buffer_capacity,
            self.config.coin_buffer_capacity,
        ));
        let supervisor = ConnectionSupervisor::new(
            self.config.ws,
            transport,
            Arc::clone(&registry),
            Arc::clone(&tracker),
            Arc::clone(&distributor),
            outbound_rx,
        );

        Ok(PriceEngine {
            inner: Arc::new(EngineInner {
                supervisor,
                registry,
                tracker,
                distributor,
                cache: self
                    .cache
                    .unwrap_or_else(|| Arc::new(NoPriceCache) as Arc<dyn PriceCache>),
            }),
        })
    }
}

#[cfg(feature = "ws-native")]
fn default_transport() -> Result<Arc<dyn Transport>, SdkError> {
    Ok(Arc::new(crate::ws::native::NativeTransport::new()))
}

#[cfg(not(feature = "ws-native"))]
fn default_transport() -> Result<Arc<dyn Transport>, SdkError> {
    Err(SdkError::Other(
        "no transport configured; enable `ws-native` or call `transport()`".to_string(),
    ))
}
