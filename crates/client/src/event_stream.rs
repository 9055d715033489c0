//! Server-sent events transport.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use flashdeck_core::{ChannelError, CloseKind};
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;
use url::Url;

use crate::transport::{spent, Connection, Connector, WireEvent};

type EventItems = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// GETs the progress stream and reads it as `text/event-stream`.
#[derive(Debug, Clone)]
pub struct EventStreamConnector {
    client: reqwest::Client,
    url: Url,
}

impl EventStreamConnector {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for EventStreamConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Connect(format!("HTTP {status}")));
        }

        Ok(Box::new(EventStreamConnection {
            events: Some(Box::pin(response.bytes_stream().eventsource())),
        }))
    }
}

struct EventStreamConnection {
    events: Option<EventItems>,
}

#[async_trait]
impl Connection for EventStreamConnection {
    async fn recv(&mut self) -> WireEvent {
        let Some(events) = self.events.as_mut() else {
            return spent();
        };

        loop {
            match events.next().await {
                // Comment lines and empty `data:` fields carry nothing to decode.
                Some(Ok(event)) if event.data.is_empty() => {
                    debug!(event = %event.event, "Skipping empty event");
                }
                Some(Ok(event)) => return WireEvent::Text(event.data),
                Some(Err(e)) => {
                    self.events = None;
                    return WireEvent::Error(e.to_string());
                }
                None => {
                    self.events = None;
                    return spent();
                }
            }
        }
    }

    async fn close(&mut self, _kind: CloseKind) {
        self.events = None;
    }
}
