use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::presence::PresenceTracker;
use crate::config::HubConfig;
use crate::error::HubError;

/// A point-to-point notification. Serialized as `{message, sender, receiver}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "sender")]
    pub from: String,
    #[serde(rename = "receiver")]
    pub to: String,
    #[serde(rename = "message")]
    pub payload: String,
}

struct Client {
    id: String,
    connection_id: Uuid,
    mailbox: mpsc::Sender<Event>,
}

struct Deregistration {
    client_id: String,
    connection_id: Uuid,
}

enum PresenceUpdate {
    Online(String, Uuid),
    Offline(String),
}

/// Handle to the hub actor. Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct EventHub {
    register_tx: mpsc::Sender<Client>,
    deregister_tx: mpsc::UnboundedSender<Deregistration>,
    dispatch_tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
    tasks: Arc<Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>>,
    mailbox_capacity: usize,
    drain_delay: Duration,
}

impl EventHub {
    /// Spawns the actor and its presence writer on the current runtime.
    pub fn start(config: &HubConfig, presence: Arc<dyn PresenceTracker>) -> Self {
        let (register_tx, register_rx) = mpsc::channel(config.queue_capacity);
        let (deregister_tx, deregister_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.queue_capacity);
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let actor = HubActor {
            registry: HashMap::new(),
            register_rx,
            deregister_rx,
            dispatch_rx,
            presence_tx,
            shutdown: shutdown.clone(),
            drain_delay: config.drain_delay(),
        };
        let actor_task = tokio::spawn(actor.run());
        let presence_task = tokio::spawn(write_presence(presence, presence_rx));
        info!(
            queue_capacity = config.queue_capacity,
            mailbox_capacity = config.mailbox_capacity,
            "event hub started"
        );

        Self {
            register_tx,
            deregister_tx,
            dispatch_tx,
            shutdown,
            tasks: Arc::new(Mutex::new(Some((actor_task, presence_task)))),
            mailbox_capacity: config.mailbox_capacity,
            drain_delay: config.drain_delay(),
        }
    }

    /// Registers `client_id` with a fresh mailbox. Any earlier registration under the
    /// same id is superseded and its mailbox closed.
    ///
    /// The returned guard deregisters when dropped.
    pub async fn connect(&self, client_id: &str) -> Result<(Registration, mpsc::Receiver<Event>), HubError> {
        let (mailbox, events) = mpsc::channel(self.mailbox_capacity);
        let connection_id = Uuid::new_v4();
        self.register_tx
            .send(Client { id: client_id.to_string(), connection_id, mailbox })
            .await
            .map_err(|_| HubError::Closed)?;

        let registration = Registration {
            client_id: client_id.to_string(),
            connection_id,
            deregister_tx: self.deregister_tx.clone(),
        };
        Ok((registration, events))
    }

    /// Queues `event` for routing. Undeliverable events are dropped by the hub, not reported.
    pub async fn dispatch(&self, event: Event) -> Result<(), HubError> {
        self.dispatch_tx.send(event).await.map_err(|_| HubError::Closed)
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Signals the actor to quit and waits for it. Idempotent.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks = self.tasks.lock().ok().and_then(|mut tasks| tasks.take());
        let Some((actor_task, presence_task)) = tasks else {
            return;
        };

        if let Err(e) = actor_task.await {
            error!(error = %e, "event hub task failed");
        }
        // the actor dropped its presence sender, so the writer ends once caught up
        if tokio::time::timeout(self.drain_delay, presence_task).await.is_err() {
            warn!("presence writer did not finish within the drain delay");
        }
        info!("event hub stopped");
    }
}

/// Live registration of one connection. Dropping it submits the deregistration.
pub struct Registration {
    client_id: String,
    connection_id: Uuid,
    deregister_tx: mpsc::UnboundedSender<Deregistration>,
}

impl Registration {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let request = Deregistration {
            client_id: std::mem::take(&mut self.client_id),
            connection_id: self.connection_id,
        };
        // fails only once the hub is gone, and then the mailbox is already closed
        let _ = self.deregister_tx.send(request);
    }
}

/// Sole owner of the registry. Every mutation and every routing decision happens here.
struct HubActor {
    registry: HashMap<String, Client>,
    register_rx: mpsc::Receiver<Client>,
    deregister_rx: mpsc::UnboundedReceiver<Deregistration>,
    dispatch_rx: mpsc::Receiver<Event>,
    presence_tx: mpsc::UnboundedSender<PresenceUpdate>,
    shutdown: CancellationToken,
    drain_delay: Duration,
}

impl HubActor {
    async fn run(mut self) {
        loop {
            // biased: a registration enqueued before a dispatch is applied first
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                client = self.register_rx.recv() => match client {
                    Some(client) => self.register(client),
                    // every EventHub handle is gone
                    None => break,
                },
                Some(request) = self.deregister_rx.recv() => self.deregister(request),
                Some(event) = self.dispatch_rx.recv() => self.dispatch(event),
            }
        }
        self.close().await;
    }

    fn register(&mut self, client: Client) {
        let _ = self.presence_tx.send(PresenceUpdate::Online(client.id.clone(), client.connection_id));
        debug!(client_id = %client.id, connection_id = %client.connection_id, "client registered");
        if let Some(previous) = self.registry.insert(client.id.clone(), client) {
            debug!(
                client_id = %previous.id,
                connection_id = %previous.connection_id,
                "registration superseded; closing previous mailbox"
            );
        }
    }

    fn deregister(&mut self, request: Deregistration) {
        let current = self
            .registry
            .get(&request.client_id)
            .is_some_and(|client| client.connection_id == request.connection_id);
        if !current {
            debug!(client_id = %request.client_id, connection_id = %request.connection_id, "stale deregistration ignored");
            return;
        }

        // dropping the sender closes the client's mailbox
        self.registry.remove(&request.client_id);
        let _ = self.presence_tx.send(PresenceUpdate::Offline(request.client_id.clone()));
        debug!(client_id = %request.client_id, connection_id = %request.connection_id, "client deregistered");
    }

    fn dispatch(&mut self, event: Event) {
        let Some(client) = self.registry.get(&event.to) else {
            debug!(from = %event.from, to = %event.to, "recipient not connected; event dropped");
            return;
        };

        // never wait on a client: a full mailbox drops the newest event
        match client.mailbox.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(from = %event.from, to = %event.to, "recipient mailbox full; event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(from = %event.from, to = %event.to, "recipient mailbox closed; event dropped");
            }
        }
    }

    /// Applies whatever is already queued (bounded by the drain delay), then closes
    /// every remaining mailbox.
    async fn close(mut self) {
        self.register_rx.close();
        self.deregister_rx.close();
        self.dispatch_rx.close();

        let drain_delay = self.drain_delay;
        let drain = async {
            loop {
                tokio::select! {
                    biased;
                    Some(client) = self.register_rx.recv() => self.register(client),
                    Some(request) = self.deregister_rx.recv() => self.deregister(request),
                    Some(event) = self.dispatch_rx.recv() => self.dispatch(event),
                    else => break,
                }
            }
        };
        if tokio::time::timeout(drain_delay, drain).await.is_err() {
            warn!("event hub drain timed out");
        }

        let remaining = self.registry.len();
        for (client_id, _) in self.registry.drain() {
            let _ = self.presence_tx.send(PresenceUpdate::Offline(client_id));
        }
        debug!(remaining, "closed remaining client mailboxes");
    }
}

/// Applies presence updates in hub order, off the hub's own loop.
async fn write_presence(presence: Arc<dyn PresenceTracker>, mut updates: mpsc::UnboundedReceiver<PresenceUpdate>) {
    while let Some(update) = updates.recv().await {
        let result = match &update {
            PresenceUpdate::Online(client_id, connection_id) => presence.set_online(client_id, *connection_id).await,
            PresenceUpdate::Offline(client_id) => presence.set_offline(client_id).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to update presence record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(100);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Online(String),
        Offline(String),
    }

    struct RecordingPresence(mpsc::UnboundedSender<Seen>);

    #[async_trait]
    impl PresenceTracker for RecordingPresence {
        async fn set_online(&self, client_id: &str, _: Uuid) -> Result<(), StoreError> {
            let _ = self.0.send(Seen::Online(client_id.to_string()));
            Ok(())
        }
        async fn set_offline(&self, client_id: &str) -> Result<(), StoreError> {
            let _ = self.0.send(Seen::Offline(client_id.to_string()));
            Ok(())
        }
    }

    fn config(mailbox_capacity: usize) -> HubConfig {
        HubConfig {
            queue_capacity: 64,
            mailbox_capacity,
            drain_delay_ms: 50,
            keepalive_secs: 300,
        }
    }

    fn start(mailbox_capacity: usize) -> (EventHub, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventHub::start(&config(mailbox_capacity), Arc::new(RecordingPresence(tx))), rx)
    }

    fn event(from: &str, to: &str, payload: &str) -> Event {
        Event { from: from.into(), to: to.into(), payload: payload.into() }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_recipient() {
        let (hub, _presence) = start(8);
        let (_c1, mut rx1) = hub.connect("c1").await.unwrap();
        let (_c2, mut rx2) = hub.connect("c2").await.unwrap();

        hub.dispatch(event("bob", "c1", "hi")).await.unwrap();

        let received = timeout(WAIT, rx1.recv()).await.unwrap().unwrap();
        assert_eq!(received, event("bob", "c1", "hi"));
        assert!(timeout(QUIET, rx2.recv()).await.is_err());
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_unregistered_recipient_does_not_block() {
        let (hub, _presence) = start(8);
        let (_c1, mut rx1) = hub.connect("c1").await.unwrap();

        for i in 0..100 {
            hub.dispatch(event("bob", "ghost", &i.to_string())).await.unwrap();
        }
        hub.dispatch(event("bob", "c1", "still here")).await.unwrap();

        let received = timeout(WAIT, rx1.recv()).await.unwrap().unwrap();
        assert_eq!(received.payload, "still here");
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_stalled_client_does_not_block_others() {
        let (hub, _presence) = start(2);
        let (_slow, mut slow_rx) = hub.connect("slow").await.unwrap();
        let (_fast, mut fast_rx) = hub.connect("fast").await.unwrap();

        for i in 0..10 {
            hub.dispatch(event("bob", "slow", &i.to_string())).await.unwrap();
        }
        hub.dispatch(event("bob", "fast", "prompt")).await.unwrap();

        let received = timeout(WAIT, fast_rx.recv()).await.unwrap().unwrap();
        assert_eq!(received.payload, "prompt");

        // only the first mailbox-full of events was kept
        assert_eq!(slow_rx.recv().await.unwrap().payload, "0");
        assert_eq!(slow_rx.recv().await.unwrap().payload, "1");
        assert!(slow_rx.try_recv().is_err());
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_fifo_per_recipient() {
        let (hub, _presence) = start(16);
        let (_c1, mut rx1) = hub.connect("c1").await.unwrap();

        for i in 0..10 {
            hub.dispatch(event("bob", "c1", &i.to_string())).await.unwrap();
        }
        for i in 0..10 {
            let received = timeout(WAIT, rx1.recv()).await.unwrap().unwrap();
            assert_eq!(received.payload, i.to_string());
        }
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_dropping_registration_deregisters() {
        let (hub, mut presence) = start(8);
        let (registration, mut rx) = hub.connect("alice").await.unwrap();
        assert_eq!(timeout(WAIT, presence.recv()).await.unwrap(), Some(Seen::Online("alice".into())));

        drop(registration);

        // mailbox closed by the hub
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
        assert_eq!(timeout(WAIT, presence.recv()).await.unwrap(), Some(Seen::Offline("alice".into())));

        // later events for alice are dropped, not queued
        let (_probe, mut probe_rx) = hub.connect("probe").await.unwrap();
        hub.dispatch(event("bob", "alice", "late")).await.unwrap();
        hub.dispatch(event("bob", "probe", "barrier")).await.unwrap();
        assert_eq!(timeout(WAIT, probe_rx.recv()).await.unwrap().unwrap().payload, "barrier");

        let (_again, mut rx) = hub.connect("alice").await.unwrap();
        assert!(timeout(QUIET, rx.recv()).await.is_err());
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_new_registration_supersedes_old() {
        let (hub, mut presence) = start(8);
        let (old, mut old_rx) = hub.connect("alice").await.unwrap();
        let (_new, mut new_rx) = hub.connect("alice").await.unwrap();

        assert_eq!(timeout(WAIT, old_rx.recv()).await.unwrap(), None);

        // the superseded connection's cleanup must not remove the new one
        drop(old);
        hub.dispatch(event("bob", "alice", "to new")).await.unwrap();
        let received = timeout(WAIT, new_rx.recv()).await.unwrap().unwrap();
        assert_eq!(received.payload, "to new");

        assert_eq!(presence.recv().await, Some(Seen::Online("alice".into())));
        assert_eq!(presence.recv().await, Some(Seen::Online("alice".into())));
        assert!(timeout(QUIET, presence.recv()).await.is_err());
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_mailboxes_and_rejects_work() {
        let (hub, mut presence) = start(8);
        let (_registration, mut rx) = hub.connect("alice").await.unwrap();
        assert!(hub.is_running());

        hub.stop().await;
        assert!(!hub.is_running());

        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
        assert!(matches!(hub.dispatch(event("bob", "alice", "x")).await, Err(HubError::Closed)));
        assert!(matches!(hub.connect("carol").await, Err(HubError::Closed)));

        assert_eq!(presence.recv().await, Some(Seen::Online("alice".into())));
        assert_eq!(presence.recv().await, Some(Seen::Offline("alice".into())));

        // second stop is a no-op
        hub.stop().await;
    }
}
