//! ADSR envelope generator.
//!
//! A rate counter steps the 8-bit level once per period. Attack climbs
//! linearly; decay and release pass through an exponential divider whose
//! period grows as the level falls.

/// Rate counter periods in cycles, shared by all four phases.
const RATE_PERIODS: [u16; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11_720, 19_532, 31_251,
];

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attack,
    Decay,
    Sustain,
    Release,
}

impl Phase {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Phase::Attack => 0,
            Phase::Decay => 1,
            Phase::Sustain => 2,
            Phase::Release => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Phase::Attack,
            1 => Phase::Decay,
            2 => Phase::Sustain,
            3 => Phase::Release,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub level: u8,
    pub phase: Phase,
    pub(crate) rate_counter: u16,
    pub(crate) exp_counter: u8,
    pub(crate) exp_period: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub(crate) prev_gate: bool,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            level: 0,
            phase: Phase::Release,
            rate_counter: 0,
            exp_counter: 0,
            exp_period: 1,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            prev_gate: false,
        }
    }

    pub fn write_attack_decay(&mut self, value: u8) {
        self.attack = value >> 4;
        self.decay = value & 0x0F;
    }

    pub fn write_sustain_release(&mut self, value: u8) {
        self.sustain = value >> 4;
        self.release = value & 0x0F;
    }

    /// Sustain level: the nybble repeated in both halves.
    fn sustain_level(&self) -> u8 {
        self.sustain * 0x11
    }

    /// Clock one cycle with the voice's current gate bit.
    pub fn clock(&mut self, gate: bool) {
        if gate && !self.prev_gate {
            self.phase = Phase::Attack;
            self.rate_counter = 0;
        } else if !gate && self.prev_gate {
            self.phase = Phase::Release;
        }
        self.prev_gate = gate;

        let rate = match self.phase {
            Phase::Attack => self.attack,
            Phase::Decay => self.decay,
            Phase::Sustain => return,
            Phase::Release => self.release,
        };

        self.rate_counter += 1;
        if self.rate_counter < RATE_PERIODS[usize::from(rate)] {
            return;
        }
        self.rate_counter = 0;

        if self.phase == Phase::Attack {
            self.exp_counter = 0;
            self.level = self.level.saturating_add(1);
            if self.level == 0xFF {
                self.phase = Phase::Decay;
            }
            self.update_exp_period();
            return;
        }

        self.exp_counter += 1;
        if self.exp_counter < self.exp_period {
            return;
        }
        self.exp_counter = 0;

        match self.phase {
            Phase::Decay => {
                let target = self.sustain_level();
                if self.level > target {
                    self.level -= 1;
                }
                if self.level <= target {
                    self.phase = Phase::Sustain;
                }
            }
            Phase::Release => self.level = self.level.saturating_sub(1),
            Phase::Attack | Phase::Sustain => {}
        }
        self.update_exp_period();
    }

    /// Exponential divider period for the current level.
    fn update_exp_period(&mut self) {
        self.exp_period = match self.level {
            0x5D..=0xFF => 1,
            0x36..=0x5C => 2,
            0x1A..=0x35 => 4,
            0x0E..=0x19 => 8,
            0x06..=0x0D => 16,
            _ => 30,
        };
    }
}
