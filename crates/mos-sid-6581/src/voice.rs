//! SID voice: oscillator and waveform generation.
//!
//! Each voice has a 24-bit phase accumulator clocked at the CPU rate, four
//! waveforms (combined by AND when several are selected), ring modulation,
//! hard sync, and a test bit that holds the oscillator at zero.

/// Control register bits.
pub const GATE: u8 = 0x01;
pub const SYNC: u8 = 0x02;
pub const RING: u8 = 0x04;
pub const TEST: u8 = 0x08;
pub const TRIANGLE: u8 = 0x10;
pub const SAWTOOTH: u8 = 0x20;
pub const PULSE: u8 = 0x40;
pub const NOISE: u8 = 0x80;

/// Noise LFSR power-on state.
const NOISE_SEED: u32 = 0x7F_FFFF;

/// A single SID oscillator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// 24-bit phase accumulator.
    pub accumulator: u32,
    pub frequency: u16,
    /// 12-bit pulse width.
    pub pulse_width: u16,
    pub control: u8,
    /// 23-bit noise shift register.
    pub noise: u32,
    /// Accumulator bit 19 last cycle, clocks the noise register.
    pub(crate) prev_bit19: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accumulator: 0,
            frequency: 0,
            pulse_width: 0,
            control: 0,
            noise: NOISE_SEED,
            prev_bit19: false,
        }
    }

    pub fn write_frequency_lo(&mut self, value: u8) {
        self.frequency = (self.frequency & 0xFF00) | u16::from(value);
    }

    pub fn write_frequency_hi(&mut self, value: u8) {
        self.frequency = (self.frequency & 0x00FF) | (u16::from(value) << 8);
    }

    pub fn write_pulse_lo(&mut self, value: u8) {
        self.pulse_width = (self.pulse_width & 0x0F00) | u16::from(value);
    }

    pub fn write_pulse_hi(&mut self, value: u8) {
        self.pulse_width = (self.pulse_width & 0x00FF) | (u16::from(value & 0x0F) << 8);
    }

    /// Advance the accumulator one cycle and clock the noise register on a
    /// rising edge of bit 19.
    pub fn clock(&mut self) {
        if self.control & TEST != 0 {
            self.accumulator = 0;
            self.noise = NOISE_SEED;
            self.prev_bit19 = false;
            return;
        }

        self.accumulator = self.accumulator.wrapping_add(u32::from(self.frequency)) & 0x00FF_FFFF;

        let bit19 = self.accumulator & (1 << 19) != 0;
        if bit19 && !self.prev_bit19 {
            let feedback = ((self.noise >> 22) ^ (self.noise >> 17)) & 1;
            self.noise = ((self.noise << 1) | feedback) & 0x7F_FFFF;
        }
        self.prev_bit19 = bit19;
    }

    /// Reset the accumulator when the sync source's MSB rose this cycle.
    pub fn sync_from(&mut self, source_rose: bool) {
        if source_rose && self.control & SYNC != 0 {
            self.accumulator = 0;
        }
    }

    /// Accumulator bit 23.
    #[must_use]
    pub fn msb(&self) -> bool {
        self.accumulator & 0x0080_0000 != 0
    }

    /// 12-bit waveform output. `ring_msb` is the MSB of the ring
    /// modulation source.
    #[must_use]
    pub fn output(&self, ring_msb: bool) -> u16 {
        let waves = self.control & 0xF0;
        if waves == 0 {
            return 0;
        }

        let mut out = 0x0FFF;
        if waves & TRIANGLE != 0 {
            let mut msb = self.msb();
            if self.control & RING != 0 {
                msb ^= ring_msb;
            }
            let ramp = ((self.accumulator >> 11) & 0x0FFF) as u16;
            out &= if msb { !ramp & 0x0FFF } else { ramp };
        }
        if waves & SAWTOOTH != 0 {
            out &= (self.accumulator >> 12) as u16;
        }
        if waves & PULSE != 0 {
            let high = ((self.accumulator >> 12) as u16) < self.pulse_width;
            out &= if high { 0x0FFF } else { 0x0000 };
        }
        if waves & NOISE != 0 {
            out &= self.noise_output();
        }
        out
    }

    /// Eight LFSR taps on the top bits of the 12-bit output.
    fn noise_output(&self) -> u16 {
        const TAPS: [u32; 8] = [20, 18, 14, 11, 9, 5, 2, 0];
        TAPS.iter().enumerate().fold(0u16, |acc, (i, &tap)| {
            acc | ((((self.noise >> tap) & 1) as u16) << (11 - i))
        })
    }
}
