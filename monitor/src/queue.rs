//! Unbounded FIFO of feed ids awaiting dispatch.
//!
//! A thin wrapper around `tokio::sync::mpsc::UnboundedSender/Receiver`, kept
//! as its own type so [`crate::dispatcher::Dispatcher`] owns a `Receiver`
//! and everything upstream (the driver, the state table's deferred-resubmit
//! path) only ever sees a cloneable `SubmissionQueue` handle.

use tokio::sync::mpsc;

/// Producer half of the submission queue.
#[derive(Clone)]
pub struct SubmissionQueue {
    tx: mpsc::UnboundedSender<u64>,
}

impl SubmissionQueue {
    /// Builds a connected producer/consumer pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Exposes the raw sender, e.g. to hand to [`crate::state::FeedStateTable`]
    /// so it can push deferred resubmissions without going through this type.
    pub fn sender(&self) -> mpsc::UnboundedSender<u64> {
        self.tx.clone()
    }

    /// Enqueues a feed id for dispatch. Never blocks: the queue is unbounded
    /// an unbounded queue is safe here because each queued item is
    /// just a `u64`, and [`crate::state::FeedStateTable`] already prevents
    /// the same feed from piling up more than one outstanding entry).
    pub fn push(&self, feed_id: u64) {
        // The receiver is only dropped at shutdown, by which point nothing
        // should still be calling push; a failed send is silently dropped.
        let _ = self.tx.send(feed_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushed_ids_arrive_in_fifo_order() {
        let (queue, mut rx) = SubmissionQueue::channel();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn push_after_receiver_drop_does_not_panic() {
        let (queue, rx) = SubmissionQueue::channel();
        drop(rx);
        queue.push(1);
    }
}
