//! 6502 processor status register (P).

/// Carry.
pub const C: u8 = 0x01;
/// Zero.
pub const Z: u8 = 0x02;
/// Interrupt disable: IRQ is ignored while set.
pub const I: u8 = 0x04;
/// Decimal mode for ADC/SBC.
pub const D: u8 = 0x08;
/// Break: only exists in pushed copies, set by BRK/PHP.
pub const B: u8 = 0x10;
/// Unused, always reads as 1.
pub const U: u8 = 0x20;
/// Overflow.
pub const V: u8 = 0x40;
/// Negative.
pub const N: u8 = 0x80;

/// Processor status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// Status from a pulled byte: B is dropped, U forced on.
    #[must_use]
    pub const fn from_stack(value: u8) -> Self {
        Self((value | U) & !B)
    }

    /// Byte pushed by BRK and PHP.
    #[must_use]
    pub const fn to_byte_brk(self) -> u8 {
        self.0 | U | B
    }

    /// Byte pushed by IRQ and NMI.
    #[must_use]
    pub const fn to_byte_irq(self) -> u8 {
        (self.0 | U) & !B
    }

    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// Update N and Z from a result.
    pub fn update_nz(&mut self, value: u8) {
        self.set_if(Z, value == 0);
        self.set_if(N, value & 0x80 != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_bytes_differ_only_in_break() {
        let p = Status(C | I);
        assert_eq!(p.to_byte_brk(), C | I | U | B);
        assert_eq!(p.to_byte_irq(), C | I | U);
        assert_eq!(Status::from_stack(0xFF).0, 0xFF & !B);
    }

    #[test]
    fn update_nz() {
        let mut p = Status::default();
        p.update_nz(0);
        assert!(p.is_set(Z) && !p.is_set(N));
        p.update_nz(0x80);
        assert!(!p.is_set(Z) && p.is_set(N));
    }
}
