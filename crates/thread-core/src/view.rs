//! Read side: a live, totally ordered view over the shared log.

use std::cmp::Ordering;

use thread_backend::{LogSubscription, MessageLog};
use thread_types::models::Message;

use crate::gate::VerifiedSession;

/// Sort a snapshot into display order: confirmed messages ascending by
/// server timestamp, pending ones after all confirmed. The sort is stable,
/// so pending messages keep their relative insertion order.
pub fn order_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| match (&a.created_at, &b.created_at) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Subscribes to the log and keeps an ordered copy of the latest snapshot.
/// Requires a `VerifiedSession` to open, like the send pipeline. Dropping
/// the view releases the subscription.
pub struct LiveMessageView {
    subscription: LogSubscription,
    current: Vec<Message>,
}

impl LiveMessageView {
    pub fn open<L: MessageLog>(_viewer: &VerifiedSession, log: &L) -> Self {
        let subscription = log.subscribe();
        let mut current = subscription.snapshot().as_ref().clone();
        order_messages(&mut current);
        Self {
            subscription,
            current,
        }
    }

    /// The current ordered view.
    pub fn messages(&self) -> &[Message] {
        &self.current
    }

    /// Wait for the next log change and return the re-ordered view.
    /// `None` once the log side has shut down.
    pub async fn next_snapshot(&mut self) -> Option<&[Message]> {
        let snapshot = self.subscription.next().await?;
        self.current = snapshot.as_ref().clone();
        order_messages(&mut self.current);
        Some(&self.current)
    }
}
