//! Bus access helpers and operand resolution.
//!
//! Every helper here performs exactly one bus access per cycle it costs,
//! including the dummy reads and writes the NMOS part makes.

use emu_core::Bus;

use crate::Mos6502;
use crate::instructions::Mode;

impl Mos6502 {
    pub(crate) fn read<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        self.step_cycles += 1;
        bus.read(addr)
    }

    pub(crate) fn write<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u8) {
        self.step_cycles += 1;
        bus.write(addr, value);
    }

    /// Read at PC and advance it.
    pub(crate) fn fetch<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = self.read(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch(bus);
        let hi = self.fetch(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Discarded read of the byte after the opcode.
    pub(crate) fn dummy_pc_read<B: Bus>(&mut self, bus: &mut B) {
        self.read(bus, self.regs.pc);
    }

    /// Discarded read of the current stack slot.
    pub(crate) fn dummy_stack_read<B: Bus>(&mut self, bus: &mut B) {
        self.read(bus, self.regs.stack_addr());
    }

    pub(crate) fn push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        let addr = self.regs.push();
        self.write(bus, addr, value);
    }

    pub(crate) fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let addr = self.regs.pop();
        self.read(bus, addr)
    }

    /// Read a zero-page pointer; the high byte wraps within page zero.
    fn read_pointer<B: Bus>(&mut self, bus: &mut B, zp: u8) -> u16 {
        let lo = self.read(bus, u16::from(zp));
        let hi = self.read(bus, u16::from(zp.wrapping_add(1)));
        u16::from_le_bytes([lo, hi])
    }

    /// Resolve the effective address of a memory operand.
    ///
    /// Returns the address and the unindexed base address. Indexed modes
    /// make their dummy read on a page cross, or always when
    /// `always_fix` is set (stores and read-modify-write).
    pub(crate) fn resolve<B: Bus>(&mut self, bus: &mut B, mode: Mode, always_fix: bool) -> (u16, u16) {
        match mode {
            Mode::ZeroPage => {
                let addr = u16::from(self.fetch(bus));
                (addr, addr)
            }
            Mode::ZeroPageX | Mode::ZeroPageY => {
                let base = self.fetch(bus);
                self.read(bus, u16::from(base));
                let index = if mode == Mode::ZeroPageX { self.regs.x } else { self.regs.y };
                (u16::from(base.wrapping_add(index)), u16::from(base))
            }
            Mode::Absolute => {
                let addr = self.fetch_word(bus);
                (addr, addr)
            }
            Mode::AbsoluteX | Mode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let index = if mode == Mode::AbsoluteX { self.regs.x } else { self.regs.y };
                let addr = self.index(bus, base, index, always_fix);
                (addr, base)
            }
            Mode::IndirectX => {
                let zp = self.fetch(bus);
                self.read(bus, u16::from(zp));
                let addr = self.read_pointer(bus, zp.wrapping_add(self.regs.x));
                (addr, addr)
            }
            Mode::IndirectY => {
                let zp = self.fetch(bus);
                let base = self.read_pointer(bus, zp);
                let addr = self.index(bus, base, self.regs.y, always_fix);
                (addr, base)
            }
            Mode::Indirect => {
                let ptr = self.fetch_word(bus);
                // The high byte never carries out of the pointer's page.
                let lo = self.read(bus, ptr);
                let hi = self.read(bus, (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF));
                let addr = u16::from_le_bytes([lo, hi]);
                (addr, addr)
            }
            Mode::Immediate | Mode::Relative => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                (addr, addr)
            }
            Mode::Implied | Mode::Accumulator => (self.regs.pc, self.regs.pc),
        }
    }

    /// Add an index to a base address, reading the unfixed address first
    /// when the sum leaves the base page.
    fn index<B: Bus>(&mut self, bus: &mut B, base: u16, index: u8, always_fix: bool) -> u16 {
        let addr = base.wrapping_add(u16::from(index));
        if always_fix || (addr ^ base) & 0xFF00 != 0 {
            self.read(bus, (base & 0xFF00) | (addr & 0x00FF));
        }
        addr
    }

    /// Fetch the value of a read operand.
    pub(crate) fn read_operand<B: Bus>(&mut self, bus: &mut B, mode: Mode) -> u8 {
        if mode == Mode::Immediate {
            return self.fetch(bus);
        }
        let (addr, _) = self.resolve(bus, mode, false);
        self.read(bus, addr)
    }

    /// Conditional branch; the offset has not been fetched yet.
    pub(crate) fn branch<B: Bus>(&mut self, bus: &mut B, taken: bool) {
        let offset = self.fetch(bus) as i8;
        if !taken {
            return;
        }
        self.dummy_pc_read(bus);
        let pc = self.regs.pc;
        let target = pc.wrapping_add(offset as u16);
        if (pc ^ target) & 0xFF00 != 0 {
            self.read(bus, (pc & 0xFF00) | (target & 0x00FF));
        }
        self.regs.pc = target;
    }
}
