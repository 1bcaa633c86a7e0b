//! Bounded FIFO queue with blocking backpressure.
//!
//! Every actor inbox and the dispatcher's outgoing queue is a
//! [`BoundedQueue`]. Producers wait while the queue is full, consumers wait
//! while it is empty, and both waits are abandoned as soon as the node's
//! [`Shutdown`] signal fires.

use std::fmt;

use crate::{
    error::{Error, Result},
    shutdown::Shutdown,
};

/// Fixed-capacity multi-producer FIFO channel.
///
/// Clones share the same underlying queue.
pub struct BoundedQueue<T> {
    tx: async_channel::Sender<T>,
    rx: async_channel::Receiver<T>,
    capacity: usize,
    shutdown: Shutdown,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, shutdown: Shutdown) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            shutdown,
        }
    }

    /// Append an item, waiting while the queue is full.
    ///
    /// Returns [`Error::Shutdown`] without inserting if the shutdown signal
    /// fires first.
    pub async fn enqueue(&self, item: T) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(Error::Shutdown);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(Error::Shutdown),
            res = self.tx.send(item) => res.map_err(|_| Error::Shutdown),
        }
    }

    /// Append an item if there is room, without waiting.
    pub fn try_enqueue(&self, item: T) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(Error::Shutdown);
        }
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(async_channel::TrySendError::Full(_)) => {
                Err(Error::Channel("queue is full".to_string()))
            }
            Err(async_channel::TrySendError::Closed(_)) => Err(Error::Shutdown),
        }
    }

    /// Remove the oldest item, waiting while the queue is empty.
    ///
    /// Returns [`Error::Shutdown`] without removing anything if the shutdown
    /// signal fires first.
    pub async fn dequeue(&self) -> Result<T> {
        if self.shutdown.is_triggered() {
            return Err(Error::Shutdown);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(Error::Shutdown),
            res = self.rx.recv() => res.map_err(|_| Error::Shutdown),
        }
    }

    /// Remove the oldest item if there is one, without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Check if the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    /// Maximum number of items the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = BoundedQueue::new(4, Shutdown::new());
        for i in 0..4 {
            queue.enqueue(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(queue.dequeue().await.unwrap(), i);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let queue = BoundedQueue::new(3, Shutdown::new());
        for i in 0..3 {
            queue.try_enqueue(i).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), 3);
        assert!(matches!(queue.try_enqueue(99), Err(Error::Channel(_))));
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_enqueue_blocks_until_dequeue() {
        let queue = BoundedQueue::new(2, Shutdown::new());
        queue.enqueue(1).await.unwrap();
        queue.enqueue(2).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(3).await })
        };

        // Producer must still be parked on the full queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue().await.unwrap(), 1);
        producer.await.unwrap().unwrap();

        assert_eq!(queue.dequeue().await.unwrap(), 2);
        assert_eq!(queue.dequeue().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dequeue_blocks_until_enqueue() {
        let queue: BoundedQueue<&'static str> = BoundedQueue::new(2, Shutdown::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.enqueue("hello").await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_producer() {
        let shutdown = Shutdown::new();
        let queue = BoundedQueue::new(1, shutdown.clone());
        queue.enqueue(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let result = producer.await.unwrap();
        assert!(matches!(result, Err(Error::Shutdown)));
        // The queue is left untouched.
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_consumer() {
        let shutdown = Shutdown::new();
        let queue: BoundedQueue<u32> = BoundedQueue::new(1, shutdown.clone());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        assert!(matches!(consumer.await.unwrap(), Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn test_many_producers_no_loss() {
        let queue = BoundedQueue::new(4, Shutdown::new());
        let mut producers = Vec::new();
        for p in 0..4u32 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    queue.enqueue(p * 100 + i).await.unwrap();
                }
            }));
        }

        let mut received = Vec::new();
        for _ in 0..100 {
            received.push(queue.dequeue().await.unwrap());
        }
        for p in producers {
            p.await.unwrap();
        }

        // Per-producer order is preserved.
        for p in 0..4u32 {
            let mine: Vec<u32> = received
                .iter()
                .copied()
                .filter(|v| v / 100 == p)
                .collect();
            let expected: Vec<u32> = (0..25).map(|i| p * 100 + i).collect();
            assert_eq!(mine, expected);
        }
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue: BoundedQueue<()> = BoundedQueue::new(0, Shutdown::new());
        assert_eq!(queue.capacity(), 1);
    }
}
