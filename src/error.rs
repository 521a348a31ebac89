//! Unified error types.

use crate::shared::CoinId;
use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// WebSocket / transport errors.
///
/// These never escape `subscribe_screen` or `unsubscribe_screen`; the supervisor
/// turns them into connection state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection attempt timed out")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },
}

impl From<serde_json::Error> for WsError {
    fn from(err: serde_json::Error) -> Self {
        WsError::DeserializationError(err.to_string())
    }
}

#[cfg(feature = "ws-native")]
impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed => WsError::Closed {
                code: Some(1000),
                reason: "Connection closed normally".to_string(),
            },
            Error::AlreadyClosed => WsError::NotConnected,
            Error::Io(e) => WsError::ConnectionFailed(e.to_string()),
            Error::Protocol(e) => WsError::ProtocolError(e.to_string()),
            Error::Url(e) => WsError::ConnectionFailed(format!("Invalid URL: {}", e)),
            Error::Http(resp) => {
                WsError::ConnectionFailed(format!("HTTP error: {:?}", resp.status()))
            }
            Error::HttpFormat(e) => WsError::ConnectionFailed(e.to_string()),
            other => WsError::ProtocolError(other.to_string()),
        }
    }
}

/// Outcome of the offline fallback policy when nothing can be shown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceDataError {
    #[error("No price data available for {coin_id} while offline")]
    NoData { coin_id: CoinId },
}
