//! Network URL constants for the price feed.

/// Default streaming price feed URL.
pub const DEFAULT_WS_URL: &str = "wss://stream.coinfeed.app/ws/prices";
