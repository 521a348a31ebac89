//! WebSocket layer — messages, subscriptions, transport.
//!
//! The physical transport is behind the [`Transport`] trait:
//! - `ws-native` feature → `tokio-tungstenite` ([`native::NativeTransport`])
//! - tests and embedders can supply their own implementation
//!
//! This module defines the feed's wire messages and the connection configuration.

pub mod backoff;
pub mod subscriptions;
pub mod transport;

#[cfg(feature = "ws-native")]
pub mod native;

use std::time::Duration;

use crate::domain::price::wire::TickWire;
use crate::error::WsError;
use crate::shared::CoinId;
use serde::{Deserialize, Serialize};

pub use backoff::BackoffConfig;
pub use subscriptions::{LiveSubscriptions, SubscribeParams, UnsubscribeParams};
pub use transport::{Connection, Frame, Transport};

// ─── Outbound messages ───────────────────────────────────────────────────────

/// Messages sent from client to feed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum MessageOut {
    #[serde(rename = "subscribe")]
    Subscribe { params: SubscribeParams },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { params: UnsubscribeParams },
    #[serde(rename = "ping")]
    Ping,
}

impl MessageOut {
    pub fn subscribe<I: IntoIterator<Item = CoinId>>(coin_ids: I) -> Self {
        MessageOut::Subscribe {
            params: SubscribeParams::new(coin_ids),
        }
    }

    pub fn unsubscribe<I: IntoIterator<Item = CoinId>>(coin_ids: I) -> Self {
        MessageOut::Unsubscribe {
            params: UnsubscribeParams::new(coin_ids),
        }
    }

    pub fn ping() -> Self {
        MessageOut::Ping
    }

    pub fn to_json(&self) -> Result<String, WsError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─── Inbound messages ────────────────────────────────────────────────────────

/// Inbound message from the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MessageIn {
    #[serde(rename = "tick")]
    Tick(TickPayload),
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error(WsErrorPayload),
}

impl MessageIn {
    pub fn parse(text: &str) -> Result<Self, WsError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickPayload {
    pub data: TickWire,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsErrorPayload {
    pub message: String,
    pub code: Option<String>,
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for the feed connection.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Bound on every individual connect attempt, initial or reconnect.
    pub connect_timeout: Duration,
    /// Application-level keepalive. `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// A missing pong after this long counts as connection loss.
    pub pong_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::network::DEFAULT_WS_URL.to_string(),
            connect_timeout: Duration::from_secs(15),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}
