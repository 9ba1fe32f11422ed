//! The shared cycle clock.

/// Monotonic cycle counter.
///
/// The single source of truth for "now". Only the scheduler advances it,
/// and nothing ever rewinds it: a machine reset leaves the count alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Clock {
    cycle: u64,
}

impl Clock {
    #[must_use]
    pub const fn new() -> Self {
        Self { cycle: 0 }
    }

    /// Clock positioned at an arbitrary cycle (snapshot restore).
    #[must_use]
    pub const fn at(cycle: u64) -> Self {
        Self { cycle }
    }

    /// Current cycle.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.cycle
    }

    /// Advance by `cycles`.
    pub fn advance(&mut self, cycles: u32) {
        self.cycle += u64::from(cycles);
    }
}

/// Crystal-derived CPU clock rate for a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// CPU clock in Hz (e.g. `985_248` for a PAL C64).
    pub frequency_hz: u32,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u32) -> Self {
        Self { frequency_hz }
    }

    /// Whole CPU cycles per period of a `hz` signal (mains, sample rate).
    #[must_use]
    pub const fn cycles_per(&self, hz: u32) -> u32 {
        if hz == 0 { 0 } else { self.frequency_hz / hz }
    }
}
