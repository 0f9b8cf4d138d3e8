//! Single-slot mailboxes between panel tasks.
//!
//! A post overwrites any value the receiver has not taken yet. There is no
//! backpressure and no queue: the receiver only ever sees the latest value.

use std::time::Duration;
use tokio::sync::watch;

/// Sending half. Cloning it gives several producers the same slot.
#[derive(Debug, Clone)]
pub struct Mailbox<T> {
    slot: watch::Sender<Option<T>>,
}

#[derive(Debug)]
pub struct MailboxReceiver<T> {
    slot: watch::Receiver<Option<T>>,
}

/// Outcome of [`MailboxReceiver::recv_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    Value(T),
    TimedOut,
    /// Every sender is gone.
    Closed,
}

pub fn mailbox<T: Clone>() -> (Mailbox<T>, MailboxReceiver<T>) {
    let (slot, rx) = watch::channel(None);
    (Mailbox { slot }, MailboxReceiver { slot: rx })
}

impl<T: Clone> Mailbox<T> {
    /// Stores `value`, replacing an unread one. Never blocks.
    pub fn post(&self, value: T) {
        self.slot.send_replace(Some(value));
    }
}

impl<T: Clone> MailboxReceiver<T> {
    /// Waits for the next posted value. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            self.slot.changed().await.ok()?;
            if let Some(value) = self.slot.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received<T> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(value)) => Received::Value(value),
            Ok(None) => Received::Closed,
            Err(_) => Received::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_write_wins() {
        let (tx, mut rx) = mailbox();
        tx.post(1);
        tx.post(2);
        assert_eq!(rx.recv().await, Some(2));

        tx.post(3);
        drop(tx);
        // The unread value is still delivered before the close is seen.
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_a_post() {
        let (tx, mut rx) = mailbox::<u8>();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).await, Received::TimedOut);
        tx.post(9);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).await, Received::Value(9));
    }
}
