//! Server-Sent Events (SSE) client for receiving push events.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use reqwest::Client;
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Error as SseError, Event, EventSource, RequestBuilderExt};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::types::EventEnvelope;

/// A stream of decoded push events.
///
/// The stream is not restartable: the first transport error is yielded once,
/// the connection is closed and the stream ends. Reconnecting is left to
/// whoever owns the session. Payloads that fail to decode are logged and
/// skipped without ending the stream.
pub struct EventStream {
    event_source: EventSource,
    closed: bool,
}

impl EventStream {
    pub(crate) fn open(http: &Client, url: &str, token: &str) -> Result<Self, GatewayError> {
        info!("Creating SSE connection to {}", url);

        let mut event_source = http
            .get(url)
            .bearer_auth(token)
            .eventsource()
            .map_err(|e| GatewayError::Sse(e.to_string()))?;
        event_source.set_retry_policy(Box::new(Never));

        Ok(Self {
            event_source,
            closed: false,
        })
    }

    /// Close the underlying connection. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            info!("Closing SSE connection");
            self.event_source.close();
            self.closed = true;
        }
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Stream for EventStream {
    type Item = Result<EventEnvelope, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.event_source).poll_next(cx) {
                Poll::Ready(Some(Ok(Event::Open))) => {
                    debug!("SSE connection opened");
                    continue;
                }
                Poll::Ready(Some(Ok(Event::Message(msg)))) => {
                    if msg.data.trim().is_empty() {
                        debug!("Ignoring empty SSE event: {}", msg.event);
                        continue;
                    }
                    match EventEnvelope::decode(&msg.data) {
                        Ok(envelope) => {
                            debug!("Received push event: {}", envelope.event.kind());
                            return Poll::Ready(Some(Ok(envelope)));
                        }
                        Err(e) => {
                            warn!("Failed to parse SSE event data: {}", e);
                            debug!("Raw data: {}", msg.data);
                            continue;
                        }
                    }
                }
                Poll::Ready(Some(Err(SseError::StreamEnded))) | Poll::Ready(None) => {
                    info!("SSE stream ended");
                    self.close();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    error!("SSE error: {}", e);
                    let err = match e {
                        SseError::InvalidStatusCode(status, _) => {
                            GatewayError::from_status(status.as_u16(), String::new())
                        }
                        other => GatewayError::Sse(other.to_string()),
                    };
                    self.close();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("closed", &self.closed)
            .finish()
    }
}
