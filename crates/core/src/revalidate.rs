//! Revalidation triggers
//!
//! A [`RevalidateTrigger`] is an application-level signal such as window
//! focus or network reconnect. Controllers attached with
//! [`Loads::revalidate_on`](crate::Loads::revalidate_on) reload with their
//! last arguments on every notification, subject to the usual policy and
//! dedup rules.

use tokio::sync::broadcast;
use tracing::trace;

const CAPACITY: usize = 16;

/// Broadcast signal asking attached controllers to reload
#[derive(Debug, Clone)]
pub struct RevalidateTrigger {
    sender: broadcast::Sender<()>,
}

impl Default for RevalidateTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl RevalidateTrigger {
    /// A trigger with no attached controllers
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Notify every attached controller, returning how many were reached
    pub fn notify(&self) -> usize {
        let reached = self.sender.send(()).unwrap_or(0);
        trace!(reached, "revalidate trigger fired");
        reached
    }

    /// Number of attached controllers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}
