//! Broadcast channel for distributing lifecycle events to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`, an `EventChannel` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op,
//! so emitting an event can never fail a task or workflow.

use tokio::sync::broadcast;

/// Multi-consumer channel for one entity's lifecycle events.
///
/// Every task and workflow owns one. Cloning the channel clones the sender,
/// so clones publish into the same stream.
pub struct EventChannel<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventChannel<E> {
    /// Create a new channel buffering up to `capacity` events per subscriber.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: E) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> Clone for EventChannel<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> std::fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
