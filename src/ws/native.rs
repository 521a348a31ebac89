//! Native WebSocket transport — `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::ws::transport::{Connection, Frame, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// Connect timeouts are enforced by the supervisor, not here.
#[derive(Debug, Clone, Default)]
pub struct NativeTransport;

impl NativeTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for NativeTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, WsError> {
        let (ws_stream, _) = connect_async(url).await.map_err(WsError::from)?;
        let (sink, stream) = ws_stream.split();
        tracing::info!("WebSocket connected to {}", url);
        Ok(Box::new(NativeConnection { sink, stream }))
    }
}

struct NativeConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Connection for NativeConnection {
    async fn send(&mut self, text: String) -> Result<(), WsError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Cancel-safe: the only await is on the read half. Protocol pings are
    /// answered by tungstenite itself, which queues the pong and flushes it on the
    /// next read or write.
    async fn recv(&mut self) -> Option<Result<Frame, WsError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    let text_str: &str = text.as_ref();
                    return Some(Ok(Frame::Text(text_str.to_string())));
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = extract_close(frame.as_ref());
                    return Some(Ok(Frame::Closed {
                        code: Some(code),
                        reason,
                    }));
                }
                Ok(_) => {} // Ping, Pong, Binary, Frame — ignore
                Err(e) => return Some(Err(WsError::from(e))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self
            .sink
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "Client disconnect".into(),
            })))
            .await;
        let _ = self.sink.close().await;
    }
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}
