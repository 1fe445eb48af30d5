use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use kvmstream_core::TransportError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

// MARK: - Frames

/// One transport frame with its boundary preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

// MARK: - Link traits

/// An open, message-oriented connection to the media server.
///
/// `recv` must be cancel safe: the connection worker races it against the
/// outbound queue.
#[async_trait]
pub trait MediaLink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next inbound frame, or `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    async fn close(&mut self);
}

/// Opens [`MediaLink`]s. Swappable so the supervisor can run over a fake.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn MediaLink>, TransportError>;
}

// MARK: - WebSocket implementation

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn MediaLink>, TransportError> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed { reason: e.to_string() })?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsLink { socket }))
    }
}

pub struct WsLink {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl MediaLink for WsLink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.socket
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed { reason: e.to_string() })
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(Bytes::from(data)))),
                // tungstenite answers pings on the next read/flush.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => {
                    return Some(Err(TransportError::ReceiveFailed { reason: e.to_string() }))
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.close(None).await;
    }
}
