//! Bounded message queue between the ingress and the dispatcher
//!
//! Multi-producer, single-consumer FIFO with a conservative admission
//! threshold and a one-way close. Admission rejects once the queue holds
//! 90% of its capacity; the margin papers over a blocking condition seen
//! under load at full capacity, so it stays until that is understood.
//!
//! Closing permits no further pushes but keeps delivering already-queued
//! items until the queue is empty, then signals end-of-stream.

use crate::request::PostMessageRequest;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Why an enqueue attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Occupancy reached the admission threshold
    AlmostFull,
    /// The queue has been closed for input
    Closed,
}

/// Fixed-capacity FIFO of accepted post requests
pub struct MessageQueue {
    items: Mutex<VecDeque<PostMessageRequest>>,
    capacity: usize,
    watermark: usize,
    closed: AtomicBool,
    /// Wakes the single consumer on push and on close
    available: Notify,
}

impl MessageQueue {
    /// Create a queue. The admission threshold is fixed at
    /// `floor(0.9 * capacity)`.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            watermark: (capacity as f64 * 0.9) as usize,
            closed: AtomicBool::new(false),
            available: Notify::new(),
        }
    }

    /// Admission-checked enqueue. Never blocks.
    pub fn try_push(&self, request: PostMessageRequest) -> Result<(), EnqueueError> {
        let mut items = self.items.lock();

        if self.closed.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }
        if items.len() >= self.watermark {
            return Err(EnqueueError::AlmostFull);
        }

        items.push_back(request);
        drop(items);

        self.available.notify_one();
        Ok(())
    }

    /// Dequeue the oldest item, waiting if the queue is momentarily
    /// empty. Returns `None` once the queue is closed and fully drained.
    ///
    /// Intended for a single consumer; the close wakeup is not fanned
    /// out to multiple waiters.
    pub async fn pop(&self) -> Option<PostMessageRequest> {
        loop {
            // Register interest before checking, so a push or close that
            // lands in between still wakes us.
            let notified = self.available.notified();

            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Close the queue for input. Queued items remain deliverable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admission threshold: occupancy at or above this rejects
    pub fn watermark(&self) -> usize {
        self.watermark
    }
}
