use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

use super::chunk::AudioChunk;

/// Per-utterance buffer between the audio producer and the pump task.
///
/// `push` never blocks the producer: audio capture must never stall on
/// backend latency, so growth is unbounded and instrumented with a high-water
/// warning instead of a cap. Utterances are short-lived, which makes favoring
/// completeness over memory bounding safe.
///
/// This is the only object crossing the producer/consumer boundary; every
/// operation is a short non-blocking critical section.
pub struct AudioFrameQueue {
    inner: Mutex<VecDeque<AudioChunk>>,
    high_water: usize,
    warned: AtomicBool,
}

impl AudioFrameQueue {
    pub fn new(high_water: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            high_water,
            warned: AtomicBool::new(false),
        }
    }

    /// Enqueue a chunk. Non-blocking, never fails.
    pub fn push(&self, chunk: AudioChunk) {
        let depth = {
            let mut inner = self.inner.lock().unwrap();
            inner.push_back(chunk);
            inner.len()
        };

        // One warning per utterance is enough to flag a slow backend.
        if depth > self.high_water && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                depth,
                high_water = self.high_water,
                "audio queue past high-water mark, backend is falling behind"
            );
        }
    }

    /// Dequeue up to `max_items` chunks in FIFO order. Non-blocking.
    pub fn pop_batch(&self, max_items: usize) -> Vec<AudioChunk> {
        let mut inner = self.inner.lock().unwrap();
        let take = max_items.min(inner.len());
        inner.drain(..take).collect()
    }

    /// Take everything still buffered, in FIFO order.
    pub fn drain_all(&self) -> Vec<AudioChunk> {
        let mut inner = self.inner.lock().unwrap();
        inner.drain(..).collect()
    }

    /// Put an unsent batch remainder back at the front, preserving order.
    ///
    /// Used by the pump when a send fails partway through a popped batch: the
    /// failed chunk and everything after it go back ahead of anything the
    /// producer pushed in the meantime.
    pub fn requeue_front(&self, chunks: Vec<AudioChunk>) {
        let mut inner = self.inner.lock().unwrap();
        for chunk in chunks.into_iter().rev() {
            inner.push_front(chunk);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
