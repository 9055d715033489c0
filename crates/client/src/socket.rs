//! WebSocket transport, used receive-only.

use async_trait::async_trait;
use flashdeck_core::{ChannelError, CloseKind, COMPLETED_CLOSE_REASON};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::transport::{spent, Connection, Connector, WireEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct SocketConnector {
    url: Url,
}

impl SocketConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Box::new(SocketConnection { socket: Some(socket) }))
    }
}

struct SocketConnection {
    socket: Option<Socket>,
}

#[async_trait]
impl Connection for SocketConnection {
    async fn recv(&mut self) -> WireEvent {
        let Some(socket) = self.socket.as_mut() else {
            return spent();
        };

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return WireEvent::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return WireEvent::Text(text),
                    Err(_) => debug!(len = bytes.len(), "Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.socket = None;
                    return match frame {
                        Some(frame) => WireEvent::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => spent(),
                    };
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.socket = None;
                    return WireEvent::Error(e.to_string());
                }
                None => {
                    self.socket = None;
                    return spent();
                }
            }
        }
    }

    async fn close(&mut self, kind: CloseKind) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        let frame = match kind {
            CloseKind::Normal => Some(CloseFrame {
                code: CloseCode::Normal,
                reason: COMPLETED_CLOSE_REASON.into(),
            }),
            CloseKind::Drop => None,
        };
        if let Err(e) = socket.close(frame).await {
            debug!(error = %e, "Close handshake failed");
        }
    }
}
