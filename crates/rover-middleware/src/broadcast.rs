//! Latest-value broadcaster: one producer, any number of independently paced
//! subscribers.
//!
//! The broadcaster owns a single slot holding the most recently published
//! value.  Publishing swaps the slot and wakes every waiting subscriber in one
//! step; it never waits on a subscriber.  A subscriber that falls behind does
//! not queue anything: when it next wakes it sees only the newest value and
//! the values in between are skipped for it.
//!
//! ```text
//!  capture thread ──publish──▶ [ slot: latest, seq, closed ] ──wake──▶ viewer 1
//!                                                            ──wake──▶ viewer 2
//!                                                            ──wake──▶ viewer N
//! ```
//!
//! Built on [`tokio::sync::watch`], which is exactly a single slot plus a
//! notify-all.  Publishing is a synchronous call, so producer loops can run
//! on plain OS threads while subscribers are Tokio tasks.

use std::sync::Arc;

use rover_types::RoverError;
use tokio::sync::watch;
use tracing::{debug, trace};

#[derive(Debug)]
struct Slot<T> {
    latest: Option<T>,
    /// Number of values published so far.
    sequence: u64,
    closed: bool,
}

/// Shared handle to a latest-value broadcast slot.  Clone it cheaply; all
/// clones share the same slot.
#[derive(Debug)]
pub struct Broadcaster<T> {
    name: Arc<str>,
    sender: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    /// Create an empty broadcaster.  `name` appears in logs and in
    /// [`RoverError::Closed`].
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(Slot {
            latest: None,
            sequence: 0,
            closed: false,
        });
        Self {
            name: Arc::from(name.into()),
            sender: Arc::new(sender),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the current value and wake all waiting subscribers.
    ///
    /// Never blocks on subscribers.  With no subscribers the value is simply
    /// stored for [`current`][Self::current].  After [`close`][Self::close]
    /// the value is discarded.
    ///
    /// Returns the number of subscribers that were notified.
    pub fn publish(&self, value: T) -> usize {
        let mut accepted = false;
        self.sender.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            slot.latest = Some(value);
            slot.sequence += 1;
            accepted = true;
            true
        });

        if !accepted {
            trace!(broadcaster = %self.name, "publish after close ignored");
            return 0;
        }
        let subscribers = self.sender.receiver_count();
        trace!(broadcaster = %self.name, subscribers, "published");
        subscribers
    }

    /// The most recently published value, without waiting.
    pub fn current(&self) -> Option<T> {
        self.sender.borrow().latest.clone()
    }

    /// Register a new subscriber.  Its first [`Subscription::next`] waits for
    /// a publish that happens after this call.
    pub fn subscribe(&self) -> Subscription<T> {
        let receiver = self.sender.subscribe();
        let seen = receiver.borrow().sequence;
        debug!(
            broadcaster = %self.name,
            subscribers = self.sender.receiver_count(),
            "subscriber registered"
        );
        Subscription {
            name: Arc::clone(&self.name),
            receiver,
            seen,
        }
    }

    /// Tear the broadcaster down.  Every waiting and future
    /// [`Subscription::next`] returns [`RoverError::Closed`].
    ///
    /// Returns `false` when it was already closed.
    pub fn close(&self) -> bool {
        let closed_now = self.sender.send_if_modified(|slot| {
            if slot.closed {
                false
            } else {
                slot.closed = true;
                true
            }
        });
        if closed_now {
            debug!(broadcaster = %self.name, "closed");
        }
        closed_now
    }

    pub fn is_closed(&self) -> bool {
        self.sender.borrow().closed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total number of values published since creation.
    pub fn published(&self) -> u64 {
        self.sender.borrow().sequence
    }
}

impl<T: Clone + Default> Broadcaster<T> {
    /// [`current`][Self::current], or `T::default()` before the first
    /// publish.
    pub fn current_or_default(&self) -> T {
        self.current().unwrap_or_default()
    }
}

/// A per-connection cursor into a [`Broadcaster`].
///
/// Holds no backlog, only the sequence number of the last value it returned.
/// Dropping it unregisters the subscriber.
pub struct Subscription<T> {
    name: Arc<str>,
    receiver: watch::Receiver<Slot<T>>,
    seen: u64,
}

impl<T: Clone> Subscription<T> {
    /// Wait until a value newer than the last one returned is published,
    /// then return the latest value.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Closed`] once the broadcaster is closed or all
    /// of its handles are dropped.
    pub async fn next(&mut self) -> Result<T, RoverError> {
        loop {
            if let Some(value) = self.take_unseen()? {
                return Ok(value);
            }
            if self.receiver.changed().await.is_err() {
                return Err(RoverError::Closed(self.name.to_string()));
            }
        }
    }

    /// Non-waiting variant of [`next`][Self::next]: `Ok(None)` when nothing
    /// new has been published.
    pub fn try_next(&mut self) -> Result<Option<T>, RoverError> {
        self.take_unseen()
    }

    fn take_unseen(&mut self) -> Result<Option<T>, RoverError> {
        let slot = self.receiver.borrow_and_update();
        if slot.closed {
            return Err(RoverError::Closed(self.name.to_string()));
        }
        if slot.sequence > self.seen
            && let Some(value) = slot.latest.as_ref()
        {
            self.seen = slot.sequence;
            return Ok(Some(value.clone()));
        }
        Ok(None)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        debug!(broadcaster = %self.name, "subscriber unregistered");
    }
}
