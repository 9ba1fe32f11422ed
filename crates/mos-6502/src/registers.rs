//! 6502 CPU registers.

use crate::flags::{I, U};
use crate::Status;

/// 6502 register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Accumulator.
    pub a: u8,
    /// X index register.
    pub x: u8,
    /// Y index register.
    pub y: u8,
    /// Stack pointer into $0100-$01FF, points at the next free byte.
    pub s: u8,
    /// Program counter.
    pub pc: u16,
    /// Processor status.
    pub p: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Power-on register contents.
    ///
    /// S starts at $00; the reset sequence decrements it three times to
    /// the familiar $FD.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0x00,
            pc: 0,
            p: Status(U | I),
        }
    }

    /// Address for a push; post-decrements S.
    pub fn push(&mut self) -> u16 {
        let addr = self.stack_addr();
        self.s = self.s.wrapping_sub(1);
        addr
    }

    /// Address for a pull; pre-increments S.
    pub fn pop(&mut self) -> u16 {
        self.s = self.s.wrapping_add(1);
        self.stack_addr()
    }

    /// Current stack address without touching S.
    #[must_use]
    pub const fn stack_addr(&self) -> u16 {
        0x0100 | (self.s as u16)
    }
}
