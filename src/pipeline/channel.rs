//! Replay-latest broadcast channel
//!
//! Every published value is delivered, in order, to every live subscriber
//! through its own unbounded queue: nothing is dropped or coalesced. The
//! channel also retains the last published value and hands it to each new
//! subscriber as its first item, so a late subscriber sees the current
//! state immediately (a replay, not a new computation).
//!
//! Dropping a [`Subscription`] unsubscribes it without affecting other
//! subscribers or the publisher.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

struct Inner<T> {
    latest: Option<T>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<T>)>,
    next_id: u64,
}

/// Cloneable handle to a replay-latest broadcast channel.
pub struct ReplayChannel<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ReplayChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for ReplayChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // Inner holds plain data; a panicked holder cannot leave it half-updated
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> ReplayChannel<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest: None,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Deliver `value` to every subscriber and retain it for late subscribers.
    ///
    /// Returns the number of subscribers it reached. Subscribers whose
    /// receiving side is gone are pruned.
    pub fn publish(&self, value: T) -> usize {
        let mut inner = lock(&self.inner);
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
        inner.latest = Some(value);
        inner.subscribers.len()
    }

    /// Subscribe; the latest value (if any) is the first item received.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        if let Some(latest) = inner.latest.clone() {
            // Receiver is alive in this scope
            let _ = tx.send(latest);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription {
            id,
            rx,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Most recently published value.
    pub fn latest(&self) -> Option<T> {
        lock(&self.inner).latest.clone()
    }

    /// Forget the retained value; new subscribers start empty.
    pub fn clear_latest(&self) {
        lock(&self.inner).latest = None;
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Receiving end of a [`ReplayChannel`].
///
/// Also usable as a `futures::Stream`.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    channel: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next value. `None` once the channel is gone and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next already-delivered value, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }

    /// Stop receiving. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            lock(&inner).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl<T> Unpin for Subscription<T> {}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_every_value_delivered_in_order() {
        let channel = ReplayChannel::new();
        let mut sub = channel.subscribe();
        for i in 0..5 {
            channel.publish(i);
        }
        assert_eq!(sub.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_late_subscriber_gets_latest_first() {
        let channel = ReplayChannel::new();
        channel.publish(1);
        channel.publish(2);
        let mut late = channel.subscribe();
        channel.publish(3);
        assert_eq!(late.drain(), vec![2, 3]);
    }

    #[test]
    fn test_subscriber_before_first_publish_gets_nothing() {
        let channel: ReplayChannel<u32> = ReplayChannel::new();
        let mut sub = channel.subscribe();
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_only_that_subscriber() {
        let channel = ReplayChannel::new();
        let mut keep = channel.subscribe();
        let gone = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        gone.unsubscribe();
        assert_eq!(channel.subscriber_count(), 1);

        assert_eq!(channel.publish(7), 1);
        assert_eq!(keep.drain(), vec![7]);
    }

    #[test]
    fn test_clear_latest() {
        let channel = ReplayChannel::new();
        channel.publish(1);
        channel.clear_latest();
        assert!(channel.latest().is_none());
        let mut sub = channel.subscribe();
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_recv_wakes_on_publish() {
        let channel = ReplayChannel::new();
        let mut sub = channel.subscribe();
        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());

        channel.publish(5);
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(5));
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let channel = ReplayChannel::new();
        let sub = channel.subscribe();
        let handle = channel.clone();
        tokio::spawn(async move {
            for i in 0..3 {
                handle.publish(i);
            }
        })
        .await
        .unwrap();
        drop(channel);
        // The subscription keeps receiving queued items after the channel is gone
        let items: Vec<i32> = sub.take(3).collect().await;
        assert_eq!(items, vec![0, 1, 2]);
    }
}
