//! # coinfeed
//!
//! Real-time coin price subscription and distribution engine for portfolio clients.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core** — Newtypes, price domain (ticks, direction tracking, cached prices)
//! 2. **WebSocket** — Wire messages, backoff policy, `Transport` seam with a
//!    `tokio-tungstenite` implementation behind `ws-native`
//! 3. **Engine** — `PriceEngine`: supervisor, subscription registry, update
//!    distribution, offline fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coinfeed::prelude::*;
//! use futures_util::StreamExt;
//!
//! let engine = PriceEngine::builder()
//!     .ws_url("wss://stream.coinfeed.app/ws/prices")
//!     .build()?;
//!
//! engine.start().await;
//! engine.subscribe_screen("portfolio", vec![CoinId::from("bitcoin"), CoinId::from("ethereum")]);
//!
//! let mut btc = engine.price_updates_for(&CoinId::from("bitcoin"));
//! while let Some(update) = btc.next().await {
//!     println!("{} {} ({})", update.coin_id, update.price, update.change_label());
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all modules.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions, state.
pub mod domain;

/// Unified error types.
pub mod error;

/// Network URL constants.
pub mod network;

// ── Layer 2: WebSocket ───────────────────────────────────────────────────────

/// WebSocket layer: messages, subscriptions, backoff, transports.
pub mod ws;

// ── Layer 3: Engine ──────────────────────────────────────────────────────────

/// `PriceEngine` — the primary entry point.
pub mod realtime;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{CoinId, ScreenId};

    // Domain types — price
    pub use crate::domain::price::{
        Direction, InMemoryPriceCache, NoPriceCache, PriceCache, PriceDirectionTracker,
        PriceUpdate, Tick,
    };

    // Errors
    pub use crate::error::{PriceDataError, SdkError, WsError};

    // Network
    pub use crate::network::DEFAULT_WS_URL;

    // WebSocket types
    pub use crate::ws::{
        BackoffConfig, Connection, Frame, MessageIn, MessageOut, SubscribeParams, Transport,
        UnsubscribeParams, WsConfig,
    };
    #[cfg(feature = "ws-native")]
    pub use crate::ws::native::NativeTransport;

    // Engine
    pub use crate::realtime::{
        ConnectionState, ConnectionStateStream, EngineConfig, InterestDelta, PriceEngine,
        PriceEngineBuilder, PriceUpdateStream, PriceView,
    };
}
