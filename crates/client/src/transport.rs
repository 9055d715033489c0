//! Transport seam between the channel driver and real sockets.

use async_trait::async_trait;
use flashdeck_core::{ChannelError, ChannelEvent, CloseKind};

/// What a live connection delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// One text frame.
    Text(String),
    /// The connection ended. `code` is only known for sockets.
    Closed { code: Option<u16>, reason: String },
    /// The connection broke.
    Error(String),
}

impl WireEvent {
    pub fn into_channel_event(self) -> ChannelEvent {
        match self {
            WireEvent::Text(text) => ChannelEvent::Message(text),
            WireEvent::Closed { code, reason } => ChannelEvent::Closed { code, reason },
            WireEvent::Error(e) => ChannelEvent::TransportError(ChannelError::Transport(e)),
        }
    }
}

/// One open push connection.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next inbound event. Once `Closed` or `Error` has been
    /// returned the connection is spent and keeps reporting `Closed`.
    async fn recv(&mut self) -> WireEvent;

    /// Release the connection. Idempotent.
    async fn close(&mut self, kind: CloseKind);
}

/// Opens connections to one fixed dial target.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError>;
}

pub(crate) fn spent() -> WireEvent {
    WireEvent::Closed {
        code: None,
        reason: String::new(),
    }
}
