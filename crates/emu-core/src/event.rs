//! Bounded output event buffers.

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;

/// Timestamped output events waiting for an external consumer.
///
/// The core never blocks on the consumer. When the buffer is full the
/// oldest event is dropped and counted. A capacity of zero disables the
/// stream.
#[derive(Debug, Clone)]
pub struct EventStream<T> {
    events: VecDeque<(u64, T)>,
    capacity: usize,
    dropped: u64,
}

impl<T> EventStream<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn push(&mut self, cycle: u64, event: T) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            if self.dropped == 0 {
                log::warn!("output sink not keeping up, dropping oldest events");
            }
            self.dropped += 1;
        }
        self.events.push_back((cycle, event));
    }

    /// Drain everything buffered so far. Later calls resume where this
    /// one stopped.
    pub fn drain(&mut self) -> Drain<'_, (u64, T)> {
        self.events.drain(..)
    }

    pub fn pop(&mut self) -> Option<(u64, T)> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped because the consumer fell behind.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
