//! Real-time notification hub.
//!
//! A single actor owns the registry of connected clients and routes events to
//! their mailboxes; each streaming connection drains its own mailbox.

mod connection;
mod event_hub;
pub mod handlers;
mod presence;

pub use connection::{encode_event, ConnectionLifecycle};
pub use event_hub::{Event, EventHub, Registration};
pub use presence::{PresenceTracker, StorePresence};
