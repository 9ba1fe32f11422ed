//! Time-of-day clock: BCD tenths, seconds, minutes and 12-hour hours.

/// Hours register PM flag.
pub const PM: u8 = 0x80;

/// A TOD time: `[tenths, seconds, minutes, hours]` in register format.
pub type TodTime = [u8; 4];

/// Register layout of midnight, the power-on time.
const POWER_ON: TodTime = [0x00, 0x00, 0x00, 0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOfDay {
    pub(crate) time: TodTime,
    pub(crate) alarm: TodTime,
    /// Snapshot returned while latched by an hours read.
    pub(crate) latch: Option<TodTime>,
    /// Stopped by an hours write until tenths are written.
    pub(crate) halted: bool,
    /// Cycles per tenth of a second.
    pub(crate) tick_cycles: u32,
    pub(crate) countdown: u32,
}

impl TimeOfDay {
    #[must_use]
    pub fn new(tick_cycles: u32) -> Self {
        let tick_cycles = tick_cycles.max(1);
        Self {
            time: POWER_ON,
            alarm: [0; 4],
            latch: None,
            halted: false,
            tick_cycles,
            countdown: tick_cycles,
        }
    }

    #[must_use]
    pub fn time(&self) -> TodTime {
        self.time
    }

    /// Advance one CPU cycle. Returns true when the alarm matches.
    pub fn clock(&mut self) -> bool {
        if self.halted {
            return false;
        }
        self.countdown -= 1;
        if self.countdown > 0 {
            return false;
        }
        self.countdown = self.tick_cycles;
        self.advance_tenth();
        self.time == self.alarm
    }

    fn advance_tenth(&mut self) {
        let [tenths, seconds, minutes, hours] = &mut self.time;
        *tenths = (*tenths + 1) & 0x0F;
        if *tenths < 10 {
            return;
        }
        *tenths = 0;
        *seconds = bcd_increment(*seconds);
        if *seconds < 0x60 {
            return;
        }
        *seconds = 0;
        *minutes = bcd_increment(*minutes);
        if *minutes < 0x60 {
            return;
        }
        *minutes = 0;

        let pm = *hours & PM;
        let hour = *hours & 0x1F;
        *hours = match hour {
            0x11 => 0x12 | (pm ^ PM),
            0x12 => 0x01 | pm,
            h => bcd_increment(h) | pm,
        };
    }

    /// Register read. `index` is 0 (tenths) to 3 (hours).
    #[must_use]
    pub fn read(&self, index: usize) -> u8 {
        self.latch.unwrap_or(self.time)[index]
    }

    /// Hours read freezes the visible time until tenths are read.
    pub fn latch(&mut self) {
        if self.latch.is_none() {
            self.latch = Some(self.time);
        }
    }

    pub fn unlatch(&mut self) {
        self.latch = None;
    }

    /// Register write to the time or, with `alarm` set, the alarm.
    pub fn write(&mut self, index: usize, value: u8, alarm: bool) {
        let value = match index {
            0 => value & 0x0F,
            1 | 2 => value & 0x7F,
            _ => value & (PM | 0x1F),
        };
        if alarm {
            self.alarm[index] = value;
            return;
        }
        self.time[index] = value;
        match index {
            3 => self.halted = true,
            0 => {
                self.halted = false;
                self.countdown = self.tick_cycles;
            }
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.tick_cycles);
    }
}

fn bcd_increment(value: u8) -> u8 {
    if value & 0x0F >= 9 {
        (value & 0xF0) + 0x10
    } else {
        value + 1
    }
}
