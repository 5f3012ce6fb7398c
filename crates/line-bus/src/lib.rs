//! Typed in-memory publish/subscribe used between the push transport, the
//! line store and the views that follow it.
//!
//! Each topic owns a broadcast channel, so any number of subscribers see every
//! event published on it. Everything published is also mirrored onto the
//! wildcard topic served by [`Bus::subscribe_all`].

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 256;

const WILDCARD: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus<E>: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<E>;
    fn subscribe_all(&self) -> broadcast::Receiver<E>;
    /// Returns how many receivers the event reached. Publishing to a topic
    /// nobody follows is not an error.
    fn publish(&self, topic: &str, event: E) -> usize;
}

#[derive(Debug)]
pub struct LocalBus<E> {
    capacity: usize,
    topics: parking_lot::RwLock<HashMap<String, broadcast::Sender<E>>>,
}

impl<E: Clone> Default for LocalBus<E> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<E: Clone> LocalBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<E> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn existing_sender(&self, topic: &str) -> Option<broadcast::Sender<E>> {
        self.topics.read().get(topic).cloned()
    }
}

impl<E: Clone + Send + Sync> Bus<E> for LocalBus<E> {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<E> {
        self.sender_for(topic).subscribe()
    }

    fn subscribe_all(&self) -> broadcast::Receiver<E> {
        self.sender_for(WILDCARD).subscribe()
    }

    fn publish(&self, topic: &str, event: E) -> usize {
        let mut delivered = 0;
        if topic != WILDCARD {
            if let Some(sender) = self.existing_sender(topic) {
                delivered += sender.send(event.clone()).unwrap_or(0);
            }
        }
        if let Some(sender) = self.existing_sender(WILDCARD) {
            delivered += sender.send(event).unwrap_or(0);
        }
        delivered
    }
}

/// Receives the next event, folding broadcast errors into [`BusError`].
pub async fn next_event<E: Clone>(rx: &mut broadcast::Receiver<E>) -> BusResult<E> {
    match rx.recv().await {
        Ok(event) => Ok(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => Err(BusError::Lagged(skipped)),
        Err(broadcast::error::RecvError::Closed) => Err(BusError::Closed),
    }
}
