//! Relay flow control: the recent-frame ring that bootstraps late joiners
//! and the per-listener bounded outbound queue.
//!
//! Both structures trade completeness for freshness, which suits live
//! audio: a stale frame is worth less than the current one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::trace;

/// Rolling history of the most recent binary frames from the broadcaster.
///
/// A new listener receives the entire ring, in original arrival order,
/// before any live frame, so it can begin decoding without waiting for the
/// next frame boundary. Oldest frames are evicted first when full.
#[derive(Debug)]
pub struct RelayBuffer {
    frames: VecDeque<Bytes>,
    capacity: usize,
}

impl RelayBuffer {
    /// Create a ring holding at most `capacity` frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest if at capacity.
    pub fn push(&mut self, frame: Bytes) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Buffered frames in original arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }

    /// Drop all buffered frames.
    ///
    /// Called when the broadcaster slot changes hands: frames from a
    /// previous source must not seed listeners of the new one.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Number of buffered frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of buffered frames.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

struct QueueInner {
    frames: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    capacity: usize,
}

/// Bounded outbound media queue for one listener.
///
/// Producers push without blocking; when the queue is at capacity the
/// oldest queued frames are dropped to make room (freshness over
/// completeness). Exactly one consumer, the connection's writer task,
/// pops frames and awaits each transport write to completion before
/// taking the next, which is what bounds this connection to one write in
/// flight.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<QueueInner>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                frames: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Append a frame, dropping the oldest queued frame(s) if at capacity.
    ///
    /// Returns the number of frames dropped.
    pub fn push(&self, frame: Bytes) -> usize {
        let mut dropped = 0;
        {
            let mut frames = self.inner.frames.lock().unwrap();
            while frames.len() >= self.inner.capacity && !frames.is_empty() {
                frames.pop_front();
                dropped += 1;
            }
            frames.push_back(frame);
        }
        if dropped > 0 {
            trace!(dropped, "Slow listener, dropped oldest queued frames");
        }
        self.inner.notify.notify_one();
        dropped
    }

    /// Take the next frame if one is queued.
    pub fn try_pop(&self) -> Option<Bytes> {
        self.inner.frames.lock().unwrap().pop_front()
    }

    /// Wait for the next frame.
    ///
    /// Cancellation-safe: a frame is only removed from the queue when this
    /// future returns it.
    pub async fn pop(&self) -> Bytes {
        loop {
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Number of queued frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.frames.lock().unwrap().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.frames.lock().unwrap().is_empty()
    }
}
