//! Timestamped register writes waiting for a chip to reach their cycle.

use std::collections::VecDeque;

use crate::{StateError, StateReader, StateWriter};

/// A CPU write to a chip register, stamped with its bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub at: u64,
    pub offset: u16,
    pub value: u8,
}

/// Register writes ordered by cycle.
///
/// The CPU runs up to one step ahead of the chips, so its writes arrive
/// before the chip has reached them. The chip pops each write when its
/// own phase reaches the write's cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteQueue {
    pending: VecDeque<RegisterWrite>,
}

impl WriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: u64, offset: u16, value: u8) {
        let write = RegisterWrite { at, offset, value };
        // Stable for equal cycles: a later write to the same cycle lands last.
        let index = self.pending.partition_point(|w| w.at <= at);
        self.pending.insert(index, write);
    }

    /// Next write due at or before `cycle`.
    pub fn pop_due(&mut self, cycle: u64) -> Option<RegisterWrite> {
        if self.pending.front().is_some_and(|w| w.at <= cycle) {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Latest pending value written to `offset`, if any.
    #[must_use]
    pub fn latest(&self, offset: u16) -> Option<u8> {
        self.pending
            .iter()
            .rev()
            .find(|w| w.offset == offset)
            .map(|w| w.value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn save(&self, w: &mut StateWriter) {
        w.put_u32(self.pending.len() as u32);
        for write in &self.pending {
            w.put_u64(write.at);
            w.put_u16(write.offset);
            w.put_u8(write.value);
        }
    }

    pub fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let count = r.u32()?;
        let mut pending = VecDeque::new();
        for _ in 0..count {
            let at = r.u64()?;
            let offset = r.u16()?;
            let value = r.u8()?;
            pending.push_back(RegisterWrite { at, offset, value });
        }
        self.pending = pending;
        Ok(())
    }
}
