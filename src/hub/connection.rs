use actix_web::web::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error};
use uuid::Uuid;

use super::event_hub::{Event, EventHub, Registration};
use crate::error::HubError;

const KEEPALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// One streaming connection: its hub registration plus the mailbox it drains.
///
/// Dropping the lifecycle, on any path, drops the registration and so deregisters.
pub struct ConnectionLifecycle {
    registration: Registration,
    events: mpsc::Receiver<Event>,
    keepalive: Interval,
}

impl ConnectionLifecycle {
    pub async fn open(hub: &EventHub, client_id: &str, keepalive: Duration) -> Result<Self, HubError> {
        let (registration, events) = hub.connect(client_id).await?;
        let mut keepalive = interval_at(Instant::now() + keepalive, keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(client_id, connection_id = %registration.connection_id(), "connection opened");
        Ok(Self { registration, events, keepalive })
    }

    pub fn client_id(&self) -> &str {
        self.registration.client_id()
    }

    pub fn connection_id(&self) -> Uuid {
        self.registration.connection_id()
    }

    /// Next frame to write, or `None` once the hub closed this mailbox.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            tokio::select! {
                biased;
                event = self.events.recv() => {
                    let event = event?;
                    match encode_event(&event) {
                        Ok(frame) => return Some(frame),
                        Err(e) => {
                            error!(client_id = %self.client_id(), error = %e, "failed to encode event");
                            continue;
                        }
                    }
                }
                _ = self.keepalive.tick() => return Some(Bytes::from_static(KEEPALIVE_FRAME)),
            }
        }
    }

    /// Response body for an SSE endpoint. The stream owns the lifecycle.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + 'static {
        futures::stream::unfold(self, |mut connection| async move {
            match connection.next_frame().await {
                Some(frame) => Some((Ok(frame), connection)),
                None => {
                    debug!(client_id = %connection.client_id(), connection_id = %connection.connection_id(), "mailbox closed; ending stream");
                    None
                }
            }
        })
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        debug!(client_id = %self.client_id(), connection_id = %self.connection_id(), "connection closed");
    }
}

/// `event: message` SSE frame carrying the JSON event.
pub fn encode_event(event: &Event) -> Result<Bytes, serde_json::Error> {
    let data = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("event: message\ndata: {}\n\n", data)))
}
