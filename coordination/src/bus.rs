//! In-process message bus for debate agents
//!
//! Every agent owns an unbounded mailbox; the bus keeps the topic →
//! subscriber map and fans published messages out to each subscriber's
//! mailbox. Messages from one publisher to one subscriber arrive in publish
//! order because each mailbox is a single FIFO channel.
//!
//! The bus also counts messages that are queued or being handled. The
//! count only reaches zero when no agent has work left, which is the
//! termination signal for a debate (see [`MessageBus::wait_idle`]).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::protocol::{AgentId, Envelope, Message, Topic};

/// Error type for bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Agent already registered: {0}")]
    AlreadyRegistered(AgentId),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(AgentId),

    #[error("Mailbox closed for {0}")]
    Disconnected(AgentId),

    #[error("Bus halted")]
    Halted,
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Shared reference to MessageBus
pub type SharedMessageBus = Arc<MessageBus>;

/// Receiving half of an agent's mailbox.
pub struct Mailbox {
    id: AgentId,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Next envelope, or `None` once the bus dropped this mailbox.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

/// Topic-based pub/sub with per-agent FIFO mailboxes
pub struct MessageBus {
    mailboxes: RwLock<HashMap<AgentId, mpsc::UnboundedSender<Envelope>>>,
    subscriptions: RwLock<HashMap<Topic, BTreeSet<AgentId>>>,
    /// Messages queued in a mailbox or currently being handled.
    pending: watch::Sender<usize>,
    halted: AtomicBool,
}

impl MessageBus {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            pending,
            halted: AtomicBool::new(false),
        }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedMessageBus {
        Arc::new(self)
    }

    /// Create the mailbox for `id`.
    pub fn register(&self, id: AgentId) -> BusResult<Mailbox> {
        let mut mailboxes = self.mailboxes.write().unwrap_or_else(|e| e.into_inner());
        if mailboxes.contains_key(&id) {
            return Err(BusError::AlreadyRegistered(id));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        mailboxes.insert(id.clone(), sender);
        debug!(agent = %id, "Mailbox registered");
        Ok(Mailbox { id, receiver })
    }

    /// Whether a mailbox exists for `id`.
    pub fn is_registered(&self, id: &AgentId) -> bool {
        self.mailboxes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Subscribe `subscriber` to `topic`. Idempotent; returns whether the
    /// subscription is new.
    pub fn subscribe(&self, subscriber: &AgentId, topic: &Topic) -> bool {
        let added = self
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.clone())
            .or_default()
            .insert(subscriber.clone());
        if added {
            debug!(agent = %subscriber, %topic, "Subscribed");
        }
        added
    }

    /// Current subscribers of `topic`, in identifier order.
    pub fn subscribers(&self, topic: &Topic) -> Vec<AgentId> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Publish `message` to every subscriber of `topic`.
    ///
    /// Never fails: a subscriber without a live mailbox is logged and
    /// skipped. Returns the number of mailboxes the message reached.
    pub fn publish(&self, message: Message, topic: &Topic, sender: Option<&AgentId>) -> usize {
        if self.is_halted() {
            debug!(kind = message.kind(), %topic, "Bus halted, publish dropped");
            return 0;
        }

        let recipients = self.subscribers(topic);
        let mut delivered = 0;
        for recipient in &recipients {
            let envelope = Envelope {
                sender: sender.cloned(),
                topic: Some(topic.clone()),
                message: message.clone(),
            };
            match self.deliver(recipient, envelope) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%topic, kind = message.kind(), "Delivery dropped: {}", e),
            }
        }

        debug!(
            kind = message.kind(),
            %topic,
            recipients = delivered,
            "Message published"
        );
        delivered
    }

    /// Point-to-point delivery to `recipient`.
    pub fn send(&self, message: Message, recipient: &AgentId, sender: Option<&AgentId>) -> BusResult<()> {
        if self.is_halted() {
            return Err(BusError::Halted);
        }
        let envelope = Envelope {
            sender: sender.cloned(),
            topic: None,
            message,
        };
        self.deliver(recipient, envelope)
    }

    fn deliver(&self, recipient: &AgentId, envelope: Envelope) -> BusResult<()> {
        let mailboxes = self.mailboxes.read().unwrap_or_else(|e| e.into_inner());
        let mailbox = mailboxes
            .get(recipient)
            .ok_or_else(|| BusError::UnknownRecipient(recipient.clone()))?;

        // Count before enqueueing so the total never dips to zero while the
        // recipient already holds the message.
        self.pending.send_modify(|n| *n += 1);
        if mailbox.send(envelope).is_err() {
            self.complete();
            return Err(BusError::Disconnected(recipient.clone()));
        }
        Ok(())
    }

    /// Mark one delivered envelope as fully handled.
    pub fn complete(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Messages queued or in flight.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until no agent has pending or in-flight messages.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives as long as `self`, so the only outcome is Ok.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting new messages; queued messages are drained unhandled.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            warn!("Message bus halted");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Drop every mailbox sender so agent loops end once drained.
    pub fn close(&self) {
        self.mailboxes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!("Message bus closed");
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
