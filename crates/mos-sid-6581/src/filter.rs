//! Multi-mode state-variable filter.
//!
//! Two integrators in a loop give simultaneous low-, band- and high-pass
//! outputs; the mode bits in $D418 pick which are summed. The 6581 has a
//! steep non-linear cutoff curve with a high floor, the 8580 a wider and
//! nearly linear one.

use crate::SidModel;

pub const LOW_PASS: u8 = 0x10;
pub const BAND_PASS: u8 = 0x20;
pub const HIGH_PASS: u8 = 0x40;

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub(crate) low: f32,
    pub(crate) band: f32,
    /// 11-bit cutoff.
    pub cutoff: u16,
    /// 4-bit resonance.
    pub resonance: u8,
    /// Mode bits as written to $D418 (bits 4-6).
    pub mode: u8,
    /// Voices routed through the filter, bits 0-2.
    pub routing: u8,
    pub(crate) model: SidModel,
}

impl Filter {
    #[must_use]
    pub fn new(model: SidModel) -> Self {
        Self {
            low: 0.0,
            band: 0.0,
            cutoff: 0,
            resonance: 0,
            mode: 0,
            routing: 0,
            model,
        }
    }

    pub fn write_cutoff_lo(&mut self, value: u8) {
        self.cutoff = (self.cutoff & 0x07F8) | u16::from(value & 0x07);
    }

    pub fn write_cutoff_hi(&mut self, value: u8) {
        self.cutoff = (self.cutoff & 0x0007) | (u16::from(value) << 3);
    }

    #[must_use]
    pub fn routes(&self, voice: usize) -> bool {
        self.routing & (1 << voice) != 0
    }

    /// Filter one input sample and return the sum of the enabled outputs.
    pub fn clock(&mut self, input: f32) -> f32 {
        let fc = self.cutoff_coefficient();
        let damping = self.damping();

        let high = input - self.low - damping * self.band;
        self.band += fc * high;
        self.low += fc * self.band;

        let mut out = 0.0;
        if self.mode & LOW_PASS != 0 {
            out += self.low;
        }
        if self.mode & BAND_PASS != 0 {
            out += self.band;
        }
        if self.mode & HIGH_PASS != 0 {
            out += high;
        }
        out
    }

    fn cutoff_coefficient(&self) -> f32 {
        let x = f32::from(self.cutoff) / 2047.0;
        match self.model {
            SidModel::Mos6581 => (0.003 + 0.02 * x + 0.33 * x * x).clamp(0.002, 0.36),
            SidModel::Mos8580 => 0.001 + 0.549 * x,
        }
    }

    /// Feedback damping; lower means more resonance.
    fn damping(&self) -> f32 {
        let r = f32::from(self.resonance) / 15.0;
        match self.model {
            SidModel::Mos6581 => 1.7 - r,
            SidModel::Mos8580 => 1.4 - 0.7 * r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_pass_passes_dc() {
        let mut filter = Filter::new(SidModel::Mos8580);
        filter.mode = LOW_PASS;
        filter.write_cutoff_hi(0x80);
        let mut out = 0.0;
        for _ in 0..10_000 {
            out = filter.clock(1.0);
        }
        assert!((out - 1.0).abs() < 0.01, "{out}");
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut filter = Filter::new(SidModel::Mos6581);
        filter.mode = HIGH_PASS;
        filter.write_cutoff_hi(0x80);
        let mut out = 1.0;
        for _ in 0..10_000 {
            out = filter.clock(1.0);
        }
        assert!(out.abs() < 0.01, "{out}");
    }

    #[test]
    fn cutoff_registers_split_eleven_bits() {
        let mut filter = Filter::new(SidModel::Mos6581);
        filter.write_cutoff_lo(0xFF);
        filter.write_cutoff_hi(0xFF);
        assert_eq!(filter.cutoff, 0x07FF);
        filter.write_cutoff_lo(0x00);
        assert_eq!(filter.cutoff, 0x07F8);
    }
}
