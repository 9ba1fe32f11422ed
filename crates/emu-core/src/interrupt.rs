//! Interrupt line levels.

/// Interrupt class a chip's output is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptClass {
    /// Level-triggered, gated by the CPU's interrupt-disable flag.
    Maskable,
    /// Edge-triggered, cannot be masked.
    NonMaskable,
}

/// Resolved interrupt levels presented to the CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InterruptLines {
    pub irq: bool,
    pub nmi: bool,
}

impl InterruptLines {
    pub const NONE: Self = Self {
        irq: false,
        nmi: false,
    };

    /// OR a chip output into its class.
    pub fn assert(&mut self, class: InterruptClass) {
        match class {
            InterruptClass::Maskable => self.irq = true,
            InterruptClass::NonMaskable => self.nmi = true,
        }
    }

    #[must_use]
    pub const fn to_bits(self) -> u8 {
        (self.irq as u8) | ((self.nmi as u8) << 1)
    }

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            irq: bits & 0x01 != 0,
            nmi: bits & 0x02 != 0,
        }
    }
}
