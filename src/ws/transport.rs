//! Transport abstraction over the physical feed connection.

use async_trait::async_trait;

use crate::error::WsError;

/// A frame surfaced to the supervisor by a [`Connection`].
///
/// Protocol-level ping/pong and binary frames are handled or dropped inside the
/// transport and never reach the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

/// Opens physical connections to the feed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, WsError>;
}

/// One open feed connection.
///
/// `recv` must be cancel-safe: the supervisor polls it inside `tokio::select!`.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, text: String) -> Result<(), WsError>;

    /// Next frame. `None` means the stream ended without a close frame.
    async fn recv(&mut self) -> Option<Result<Frame, WsError>>;

    async fn close(&mut self);
}
