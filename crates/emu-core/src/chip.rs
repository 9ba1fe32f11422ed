//! Peripheral chip capability.

/// Request to hold the bus away from the CPU.
///
/// The bus is unavailable during `[from_cycle, from_cycle + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStall {
    pub from_cycle: u64,
    pub duration: u32,
}

impl BusStall {
    #[must_use]
    pub const fn new(from_cycle: u64, duration: u32) -> Self {
        Self {
            from_cycle,
            duration,
        }
    }

    /// First cycle after the stall.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.from_cycle + self.duration as u64
    }

    /// Cycles of this stall still ahead at `now`, zero if it has not
    /// started yet or is already over.
    #[must_use]
    pub fn remaining_at(&self, now: u64) -> u32 {
        if now < self.from_cycle || now >= self.end() {
            0
        } else {
            (self.end() - now) as u32
        }
    }
}

/// Read-only memory view for chips that fetch on their own.
///
/// Addresses are in the chip's own address space; the machine decides
/// what they decode to.
pub trait DmaView {
    fn dma_read(&self, address: u16) -> u8;

    /// Read from secondary data lines (the video chip's colour nybbles).
    fn dma_read_nybble(&self, _address: u16) -> u8 {
        0x0F
    }
}

/// View for chips that never fetch.
pub struct NoDma;

impl DmaView for NoDma {
    fn dma_read(&self, _address: u16) -> u8 {
        0xFF
    }
}

/// A memory-mapped peripheral chip.
///
/// Chips never decide "when": the scheduler ticks them for the cycles the
/// CPU just consumed. Register accesses carry the absolute cycle they
/// happened on, which is at or after the chip's own position because the
/// CPU runs ahead of the chips by at most one step.
pub trait Chip {
    /// Advance exactly `cycles` cycles, applying due register writes and
    /// producing output events, interrupt transitions and stall requests.
    fn tick(&mut self, cycles: u32, dma: &dyn DmaView);

    /// Return registers and phase counters to power-on state. The cycle
    /// count is preserved.
    fn reset(&mut self);

    /// CPU read of a register, with side effects.
    fn read_register(&mut self, offset: u16, at: u64) -> u8;

    /// CPU write of a register.
    fn write_register(&mut self, offset: u16, value: u8, at: u64);

    /// Register value without side effects.
    fn peek_register(&self, offset: u16) -> u8;

    /// Level of the chip's interrupt output.
    fn irq_asserted(&self) -> bool;

    /// Next pending bus stall request, if any.
    fn take_stall(&mut self) -> Option<BusStall> {
        None
    }

    /// Total cycles ticked since power-on.
    fn cycles(&self) -> u64;
}
