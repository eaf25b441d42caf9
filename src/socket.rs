//! Text-frame WebSocket transport behind a small trait pair, so the stream loop can run
//! against `tokio-tungstenite` in production and an in-memory socket in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::{error::Result, util::redact_ws_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Closed,
    Error(String),
}

#[async_trait]
pub trait FrameSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Must be cancel-safe: the stream loop races it against the heartbeat and stop signal.
    async fn next_event(&mut self) -> SocketEvent;

    async fn close(&mut self);
}

#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSocket>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketFactory for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSocket>> {
        debug!(url = %redact_ws_url(url), "ws connect");
        let (stream, _) = connect_async(url).await?;
        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSocket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> SocketEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return SocketEvent::Text(text),
                    Err(_) => debug!(len = bytes.len(), "ws binary frame ignored"),
                },
                // tungstenite queues the Pong reply on its own.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "ws closed by server");
                    return SocketEvent::Closed;
                }
                Some(Err(WsError::ConnectionClosed)) | None => return SocketEvent::Closed,
                Some(Err(error)) => return SocketEvent::Error(error.to_string()),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            debug!(%error, "ws close failed");
        }
    }
}
