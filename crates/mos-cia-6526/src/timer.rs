//! 16-bit interval timer.

/// Control register: start.
pub const START: u8 = 0x01;
/// Control register: show underflow on PB6/PB7.
pub const PB_ON: u8 = 0x02;
/// Control register: PB output toggles instead of pulsing.
pub const TOGGLE: u8 = 0x04;
/// Control register: stop after the next underflow.
pub const ONE_SHOT: u8 = 0x08;
/// Control register: strobe, copy the latch into the counter.
pub const FORCE_LOAD: u8 = 0x10;

/// One CIA timer.
///
/// A timer clocked while its counter is zero underflows: it reloads from
/// the latch and, in one-shot mode, clears its start bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub(crate) counter: u16,
    pub(crate) latch: u16,
    pub(crate) control: u8,
    pub(crate) force_load: bool,
    /// PB toggle output.
    pub(crate) toggle: bool,
    /// PB pulse output, high for the cycle after an underflow.
    pub(crate) pulse: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            control: 0,
            force_load: false,
            toggle: false,
            pulse: false,
        }
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.control & START != 0
    }

    #[must_use]
    pub fn counter(&self) -> u16 {
        self.counter
    }

    #[must_use]
    pub fn latch(&self) -> u16 {
        self.latch
    }

    /// Advance one cycle. `count` says whether the selected input clocks
    /// this cycle. Returns true on underflow.
    pub fn clock(&mut self, count: bool) -> bool {
        self.pulse = false;

        if self.force_load {
            self.counter = self.latch;
            self.force_load = false;
        }

        if !self.running() || !count {
            return false;
        }

        if self.counter == 0 {
            self.counter = self.latch;
            if self.control & ONE_SHOT != 0 {
                self.control &= !START;
            }
            self.toggle = !self.toggle;
            self.pulse = true;
            true
        } else {
            self.counter -= 1;
            false
        }
    }

    pub fn write_latch_lo(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    /// High latch byte; a stopped timer also loads its counter.
    pub fn write_latch_hi(&mut self, value: u8) {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
        if !self.running() {
            self.counter = self.latch;
        }
    }

    pub fn write_control(&mut self, value: u8) {
        let was_running = self.running();
        self.control = value & !FORCE_LOAD;
        if value & FORCE_LOAD != 0 {
            self.force_load = true;
        }
        if !was_running && self.running() {
            self.toggle = true;
        }
    }

    /// Level this timer drives onto its PB pin.
    #[must_use]
    pub fn output(&self) -> bool {
        if self.control & TOGGLE != 0 {
            self.toggle
        } else {
            self.pulse
        }
    }
}
