//! Cycle-exact NMOS 6502/6510 CPU core.
//!
//! `step` runs one whole instruction (or interrupt, or reset sequence)
//! and returns the cycles it took. Each of those cycles is exactly one
//! bus access, dummy accesses included, so a bus that timestamps its
//! accesses sees the same cycle-by-cycle traffic as the real part.
//!
//! All 256 opcodes are implemented, including the undocumented ones.
//! The unstable group (ANE, LXA, SHA, SHX, SHY, TAS) uses the usual
//! magic-constant and high-byte-AND models. The twelve JAM opcodes halt
//! the core until reset.

pub mod flags;
mod addressing;
mod instructions;
mod registers;

use emu_core::{Bus, Cpu, InterruptLines, Observable, SaveState, StateError, StateReader, StateWriter, Value};

pub use flags::Status;
pub use instructions::{Instruction, Mode, decode};
pub use registers::Registers;

use flags::{B, C, D, I, N, V, Z};

/// NMI vector.
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector.
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector.
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles of the reset sequence.
pub const RESET_CYCLES: u32 = 7;

/// The 6502 CPU.
#[derive(Debug, Clone)]
pub struct Mos6502 {
    pub regs: Registers,
    /// Bus accesses made by the current step.
    step_cycles: u32,
    /// Total cycles executed since construction.
    total_cycles: u64,
    nmi_level: bool,
    irq_level: bool,
    /// Latched NMI edge, serviced at the next instruction boundary.
    nmi_pending: bool,
    /// I flag as seen by the interrupt poll. Lags by one instruction
    /// after CLI, SEI and PLP.
    poll_i: bool,
    reset_pending: bool,
    jammed: bool,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    /// A powered-on CPU. The first `step` runs the reset sequence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            step_cycles: 0,
            total_cycles: 0,
            nmi_level: false,
            irq_level: false,
            nmi_pending: false,
            poll_i: true,
            reset_pending: true,
            jammed: false,
        }
    }

    /// Jump straight to `pc`, abandoning a pending reset.
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
        self.reset_pending = false;
        self.poll_i = self.regs.p.is_set(I);
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// Request a reset. The sequence runs on the next `step`.
    pub fn reset(&mut self) {
        self.reset_pending = true;
    }

    /// Sample the interrupt inputs. NMI latches on a rising edge; IRQ is
    /// a level polled at each instruction boundary.
    pub fn set_interrupt_lines(&mut self, lines: InterruptLines) {
        if lines.nmi && !self.nmi_level {
            self.nmi_pending = true;
        }
        self.nmi_level = lines.nmi;
        self.irq_level = lines.irq;
    }

    /// Total cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// True once a JAM opcode has halted the core.
    #[must_use]
    pub fn is_jammed(&self) -> bool {
        self.jammed
    }

    /// True while a latched NMI is waiting to be serviced.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// True if the next step will run the reset sequence.
    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    // =========================================================================
    // Sequences
    // =========================================================================

    /// Reset: two reads at PC, three stack reads with S decrementing
    /// (writes are suppressed), then the vector.
    fn reset_sequence<B: Bus>(&mut self, bus: &mut B) {
        self.dummy_pc_read(bus);
        self.dummy_pc_read(bus);
        for _ in 0..3 {
            let addr = self.regs.push();
            self.read(bus, addr);
        }
        self.regs.p.set(I);
        self.regs.pc = self.read_vector(bus, RESET_VECTOR);
        self.reset_pending = false;
        self.nmi_pending = false;
        self.jammed = false;
        self.poll_i = true;
        log::debug!("6502 reset, PC=${:04X}", self.regs.pc);
    }

    /// IRQ or NMI: the opcode fetch is discarded and PC is not advanced.
    fn interrupt_sequence<B: Bus>(&mut self, bus: &mut B, vector: u16) {
        self.dummy_pc_read(bus);
        self.dummy_pc_read(bus);
        let [lo, hi] = self.regs.pc.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
        let p = self.regs.p.to_byte_irq();
        self.push(bus, p);
        self.regs.p.set(I);
        self.regs.pc = self.read_vector(bus, vector);
        self.poll_i = true;
    }

    fn brk<B: Bus>(&mut self, bus: &mut B) {
        // Signature byte.
        self.fetch(bus);
        let [lo, hi] = self.regs.pc.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
        let p = self.regs.p.to_byte_brk();
        self.push(bus, p);
        self.regs.p.set(I);
        self.regs.pc = self.read_vector(bus, IRQ_VECTOR);
    }

    fn read_vector<B: Bus>(&mut self, bus: &mut B, vector: u16) -> u16 {
        let lo = self.read(bus, vector);
        let hi = self.read(bus, vector.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    // =========================================================================
    // ALU
    // =========================================================================

    fn set_a(&mut self, value: u8) {
        self.regs.a = value;
        self.regs.p.update_nz(value);
    }

    fn set_x(&mut self, value: u8) {
        self.regs.x = value;
        self.regs.p.update_nz(value);
    }

    fn set_y(&mut self, value: u8) {
        self.regs.y = value;
        self.regs.p.update_nz(value);
    }

    fn carry(&self) -> u8 {
        u8::from(self.regs.p.is_set(C))
    }

    fn adc(&mut self, value: u8) {
        if self.regs.p.is_set(D) {
            self.adc_decimal(value);
        } else {
            self.adc_binary(value);
        }
    }

    fn adc_binary(&mut self, value: u8) {
        let a = self.regs.a;
        let sum = u16::from(a) + u16::from(value) + u16::from(self.carry());
        let result = sum as u8;
        self.regs.p.set_if(C, sum > 0xFF);
        self.regs.p.set_if(V, (a ^ result) & (value ^ result) & 0x80 != 0);
        self.set_a(result);
    }

    /// NMOS decimal add. Z reflects the binary sum; N and V are taken
    /// from the intermediate high nybble before the final adjust.
    fn adc_decimal(&mut self, value: u8) {
        let a = self.regs.a;
        let c = self.carry();
        let binary = a.wrapping_add(value).wrapping_add(c);

        let mut lo = (a & 0x0F) + (value & 0x0F) + c;
        if lo > 9 {
            lo += 6;
        }
        let mut hi = (a >> 4) + (value >> 4) + u8::from(lo > 0x0F);

        self.regs.p.set_if(Z, binary == 0);
        self.regs.p.set_if(N, hi & 0x08 != 0);
        self.regs.p.set_if(V, ((hi << 4) ^ a) & !(a ^ value) & 0x80 != 0);

        if hi > 9 {
            hi += 6;
        }
        self.regs.p.set_if(C, hi > 0x0F);
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    fn sbc(&mut self, value: u8) {
        if self.regs.p.is_set(D) {
            self.sbc_decimal(value);
        } else {
            self.adc_binary(!value);
        }
    }

    /// NMOS decimal subtract. All flags come from the binary result.
    fn sbc_decimal(&mut self, value: u8) {
        let a = self.regs.a;
        let borrow = i16::from(1 - self.carry());

        let mut lo = i16::from(a & 0x0F) - i16::from(value & 0x0F) - borrow;
        let mut hi = i16::from(a >> 4) - i16::from(value >> 4);
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }

        self.adc_binary(!value);
        self.regs.a = (((hi as u8) << 4) & 0xF0) | (lo as u8 & 0x0F);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.p.set_if(C, register >= value);
        self.regs.p.update_nz(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.regs.p.set_if(C, value & 0x80 != 0);
        let result = value << 1;
        self.regs.p.update_nz(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.regs.p.set_if(C, value & 0x01 != 0);
        let result = value >> 1;
        self.regs.p.update_nz(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.carry();
        self.regs.p.set_if(C, value & 0x80 != 0);
        self.regs.p.update_nz(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (self.carry() << 7);
        self.regs.p.set_if(C, value & 0x01 != 0);
        self.regs.p.update_nz(result);
        result
    }

    fn bit(&mut self, value: u8) {
        self.regs.p.set_if(Z, self.regs.a & value == 0);
        self.regs.p.set_if(N, value & 0x80 != 0);
        self.regs.p.set_if(V, value & 0x40 != 0);
    }

    /// ARR: AND then ROR of A, with C and V taken from bits 6 and 5.
    fn arr(&mut self, value: u8) {
        let and = self.regs.a & value;
        let result = (and >> 1) | (self.carry() << 7);
        if self.regs.p.is_set(D) {
            self.arr_decimal(and, result);
            return;
        }
        self.set_a(result);
        self.regs.p.set_if(C, result & 0x40 != 0);
        self.regs.p.set_if(V, ((result >> 6) ^ (result >> 5)) & 0x01 != 0);
    }

    /// NMOS decimal ARR. N and Z come from the rotated value; each nibble
    /// then gets a BCD fix-up judged on the unrotated AND.
    fn arr_decimal(&mut self, and: u8, rotated: u8) {
        self.regs.p.update_nz(rotated);
        self.regs.p.set_if(V, (rotated ^ and) & 0x40 != 0);
        let mut result = rotated;
        if (and & 0x0F) + (and & 0x01) > 0x05 {
            result = (result & 0xF0) | (result.wrapping_add(0x06) & 0x0F);
        }
        let carry = u16::from(and & 0xF0) + u16::from(and & 0x10) > 0x50;
        if carry {
            result = (result & 0x0F) | (result.wrapping_add(0x60) & 0xF0);
        }
        self.regs.p.set_if(C, carry);
        self.regs.a = result;
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn execute<B: Bus>(&mut self, bus: &mut B) {
        use Instruction::*;

        let opcode_addr = self.regs.pc;
        let opcode = self.fetch(bus);
        let (instruction, mode) = decode(opcode);
        let i_before = self.regs.p.is_set(I);

        match instruction {
            // Loads and logic
            Lda => {
                let v = self.read_operand(bus, mode);
                self.set_a(v);
            }
            Ldx => {
                let v = self.read_operand(bus, mode);
                self.set_x(v);
            }
            Ldy => {
                let v = self.read_operand(bus, mode);
                self.set_y(v);
            }
            Lax => {
                let v = self.read_operand(bus, mode);
                self.regs.x = v;
                self.set_a(v);
            }
            Ora => {
                let v = self.read_operand(bus, mode);
                self.set_a(self.regs.a | v);
            }
            And => {
                let v = self.read_operand(bus, mode);
                self.set_a(self.regs.a & v);
            }
            Eor => {
                let v = self.read_operand(bus, mode);
                self.set_a(self.regs.a ^ v);
            }
            Adc => {
                let v = self.read_operand(bus, mode);
                self.adc(v);
            }
            Sbc => {
                let v = self.read_operand(bus, mode);
                self.sbc(v);
            }
            Cmp => {
                let v = self.read_operand(bus, mode);
                self.compare(self.regs.a, v);
            }
            Cpx => {
                let v = self.read_operand(bus, mode);
                self.compare(self.regs.x, v);
            }
            Cpy => {
                let v = self.read_operand(bus, mode);
                self.compare(self.regs.y, v);
            }
            Bit => {
                let v = self.read_operand(bus, mode);
                self.bit(v);
            }
            Nop => {
                if mode == Mode::Implied {
                    self.dummy_pc_read(bus);
                } else {
                    self.read_operand(bus, mode);
                }
            }

            // Stores
            Sta => self.store(bus, mode, self.regs.a),
            Stx => self.store(bus, mode, self.regs.x),
            Sty => self.store(bus, mode, self.regs.y),
            Sax => self.store(bus, mode, self.regs.a & self.regs.x),
            Sha => self.store_high_and(bus, mode, self.regs.a & self.regs.x),
            Shx => self.store_high_and(bus, mode, self.regs.x),
            Shy => self.store_high_and(bus, mode, self.regs.y),
            Tas => {
                self.regs.s = self.regs.a & self.regs.x;
                self.store_high_and(bus, mode, self.regs.s);
            }

            // Read-modify-write
            Asl | Lsr | Rol | Ror if mode == Mode::Accumulator => {
                self.dummy_pc_read(bus);
                let a = self.regs.a;
                self.regs.a = match instruction {
                    Asl => self.asl(a),
                    Lsr => self.lsr(a),
                    Rol => self.rol(a),
                    _ => self.ror(a),
                };
            }
            Asl | Lsr | Rol | Ror | Inc | Dec | Slo | Rla | Sre | Rra | Dcp | Isc => {
                self.read_modify_write(bus, instruction, mode);
            }

            // Immediate-only undocumented
            Anc => {
                let v = self.fetch(bus);
                self.set_a(self.regs.a & v);
                self.regs.p.set_if(C, self.regs.a & 0x80 != 0);
            }
            Alr => {
                let v = self.fetch(bus);
                let and = self.regs.a & v;
                self.regs.a = self.lsr(and);
            }
            Arr => {
                let v = self.fetch(bus);
                self.arr(v);
            }
            Ane => {
                let v = self.fetch(bus);
                self.set_a((self.regs.a | 0xEE) & self.regs.x & v);
            }
            Lxa => {
                let v = self.fetch(bus);
                let result = (self.regs.a | 0xEE) & v;
                self.regs.x = result;
                self.set_a(result);
            }
            Sbx => {
                let v = self.fetch(bus);
                let ax = self.regs.a & self.regs.x;
                self.regs.p.set_if(C, ax >= v);
                self.set_x(ax.wrapping_sub(v));
            }
            Las => {
                let v = self.read_operand(bus, mode) & self.regs.s;
                self.regs.s = v;
                self.regs.x = v;
                self.set_a(v);
            }

            // Register transfers and counters
            Tax => self.implied(bus, |cpu| cpu.set_x(cpu.regs.a)),
            Tay => self.implied(bus, |cpu| cpu.set_y(cpu.regs.a)),
            Txa => self.implied(bus, |cpu| cpu.set_a(cpu.regs.x)),
            Tya => self.implied(bus, |cpu| cpu.set_a(cpu.regs.y)),
            Tsx => self.implied(bus, |cpu| cpu.set_x(cpu.regs.s)),
            Txs => self.implied(bus, |cpu| cpu.regs.s = cpu.regs.x),
            Inx => self.implied(bus, |cpu| cpu.set_x(cpu.regs.x.wrapping_add(1))),
            Iny => self.implied(bus, |cpu| cpu.set_y(cpu.regs.y.wrapping_add(1))),
            Dex => self.implied(bus, |cpu| cpu.set_x(cpu.regs.x.wrapping_sub(1))),
            Dey => self.implied(bus, |cpu| cpu.set_y(cpu.regs.y.wrapping_sub(1))),

            // Flags
            Clc => self.implied(bus, |cpu| cpu.regs.p.clear(C)),
            Sec => self.implied(bus, |cpu| cpu.regs.p.set(C)),
            Cli => self.implied(bus, |cpu| cpu.regs.p.clear(I)),
            Sei => self.implied(bus, |cpu| cpu.regs.p.set(I)),
            Clv => self.implied(bus, |cpu| cpu.regs.p.clear(V)),
            Cld => self.implied(bus, |cpu| cpu.regs.p.clear(D)),
            Sed => self.implied(bus, |cpu| cpu.regs.p.set(D)),

            // Stack
            Pha => {
                self.dummy_pc_read(bus);
                self.push(bus, self.regs.a);
            }
            Php => {
                self.dummy_pc_read(bus);
                let p = self.regs.p.to_byte_brk();
                self.push(bus, p);
            }
            Pla => {
                self.dummy_pc_read(bus);
                self.dummy_stack_read(bus);
                let v = self.pull(bus);
                self.set_a(v);
            }
            Plp => {
                self.dummy_pc_read(bus);
                self.dummy_stack_read(bus);
                let v = self.pull(bus);
                self.regs.p = Status::from_stack(v);
            }

            // Control flow
            Jmp => {
                let (addr, _) = self.resolve(bus, mode, false);
                self.regs.pc = addr;
            }
            Jsr => {
                let lo = self.fetch(bus);
                self.dummy_stack_read(bus);
                let [pcl, pch] = self.regs.pc.to_le_bytes();
                self.push(bus, pch);
                self.push(bus, pcl);
                let hi = self.read(bus, self.regs.pc);
                self.regs.pc = u16::from_le_bytes([lo, hi]);
            }
            Rts => {
                self.dummy_pc_read(bus);
                self.dummy_stack_read(bus);
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.regs.pc = u16::from_le_bytes([lo, hi]);
                self.fetch(bus);
            }
            Rti => {
                self.dummy_pc_read(bus);
                self.dummy_stack_read(bus);
                let p = self.pull(bus);
                self.regs.p = Status::from_stack(p);
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.regs.pc = u16::from_le_bytes([lo, hi]);
            }
            Brk => self.brk(bus),

            Bpl => self.branch(bus, !self.regs.p.is_set(N)),
            Bmi => self.branch(bus, self.regs.p.is_set(N)),
            Bvc => self.branch(bus, !self.regs.p.is_set(V)),
            Bvs => self.branch(bus, self.regs.p.is_set(V)),
            Bcc => self.branch(bus, !self.regs.p.is_set(C)),
            Bcs => self.branch(bus, self.regs.p.is_set(C)),
            Bne => self.branch(bus, !self.regs.p.is_set(Z)),
            Beq => self.branch(bus, self.regs.p.is_set(Z)),

            Jam => {
                self.read(bus, 0xFFFF);
                self.regs.pc = opcode_addr;
                self.jammed = true;
                log::trace!("6502 jammed at ${opcode_addr:04X} (opcode ${opcode:02X})");
            }
        }

        // CLI, SEI and PLP change I after the interrupt poll has happened.
        self.poll_i = match instruction {
            Cli | Sei | Plp => i_before,
            _ => self.regs.p.is_set(I),
        };
    }

    /// Two-cycle implied instruction.
    fn implied<B: Bus>(&mut self, bus: &mut B, op: impl FnOnce(&mut Self)) {
        self.dummy_pc_read(bus);
        op(self);
    }

    fn store<B: Bus>(&mut self, bus: &mut B, mode: Mode, value: u8) {
        let (addr, _) = self.resolve(bus, mode, true);
        self.write(bus, addr, value);
    }

    /// SHA/SHX/SHY/TAS: the stored value is ANDed with the base high byte
    /// plus one. When indexing crosses a page the value also replaces the
    /// high byte of the target address.
    fn store_high_and<B: Bus>(&mut self, bus: &mut B, mode: Mode, source: u8) {
        let (addr, base) = self.resolve(bus, mode, true);
        let value = source & ((base >> 8) as u8).wrapping_add(1);
        let addr = if (addr ^ base) & 0xFF00 != 0 {
            (u16::from(value) << 8) | (addr & 0x00FF)
        } else {
            addr
        };
        self.write(bus, addr, value);
    }

    /// Read, write back the original, write the result.
    fn read_modify_write<B: Bus>(&mut self, bus: &mut B, instruction: Instruction, mode: Mode) {
        use Instruction::*;

        let (addr, _) = self.resolve(bus, mode, true);
        let value = self.read(bus, addr);
        self.write(bus, addr, value);

        let result = match instruction {
            Asl => self.asl(value),
            Lsr => self.lsr(value),
            Rol => self.rol(value),
            Ror => self.ror(value),
            Inc => {
                let r = value.wrapping_add(1);
                self.regs.p.update_nz(r);
                r
            }
            Dec => {
                let r = value.wrapping_sub(1);
                self.regs.p.update_nz(r);
                r
            }
            Slo => {
                let r = self.asl(value);
                self.set_a(self.regs.a | r);
                r
            }
            Rla => {
                let r = self.rol(value);
                self.set_a(self.regs.a & r);
                r
            }
            Sre => {
                let r = self.lsr(value);
                self.set_a(self.regs.a ^ r);
                r
            }
            Rra => {
                let r = self.ror(value);
                self.adc(r);
                r
            }
            Dcp => {
                let r = value.wrapping_sub(1);
                self.compare(self.regs.a, r);
                r
            }
            Isc => {
                let r = value.wrapping_add(1);
                self.sbc(r);
                r
            }
            _ => value,
        };
        self.write(bus, addr, result);
    }
}

impl<B: Bus> Cpu<B> for Mos6502 {
    fn step(&mut self, bus: &mut B) -> u32 {
        self.step_cycles = 0;

        if self.reset_pending {
            self.reset_sequence(bus);
        } else if self.jammed {
            self.read(bus, 0xFFFF);
        } else if self.nmi_pending {
            self.nmi_pending = false;
            self.interrupt_sequence(bus, NMI_VECTOR);
        } else if self.irq_level && !self.poll_i {
            self.interrupt_sequence(bus, IRQ_VECTOR);
        } else {
            self.execute(bus);
        }

        self.total_cycles += u64::from(self.step_cycles);
        self.step_cycles
    }

    fn reset(&mut self) {
        Mos6502::reset(self);
    }

    fn set_interrupt_lines(&mut self, lines: InterruptLines) {
        Mos6502::set_interrupt_lines(self, lines);
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn is_halted(&self) -> bool {
        self.jammed
    }
}

impl SaveState for Mos6502 {
    fn save_state(&self, w: &mut StateWriter) {
        w.put_u8(self.regs.a);
        w.put_u8(self.regs.x);
        w.put_u8(self.regs.y);
        w.put_u8(self.regs.s);
        w.put_u16(self.regs.pc);
        w.put_u8(self.regs.p.0);
        w.put_u64(self.total_cycles);
        w.put_bool(self.nmi_level);
        w.put_bool(self.irq_level);
        w.put_bool(self.nmi_pending);
        w.put_bool(self.poll_i);
        w.put_bool(self.reset_pending);
        w.put_bool(self.jammed);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let regs = Registers {
            a: r.u8()?,
            x: r.u8()?,
            y: r.u8()?,
            s: r.u8()?,
            pc: r.u16()?,
            p: Status::from_stack(r.u8()?),
        };
        let total_cycles = r.u64()?;
        let nmi_level = r.bool()?;
        let irq_level = r.bool()?;
        let nmi_pending = r.bool()?;
        let poll_i = r.bool()?;
        let reset_pending = r.bool()?;
        let jammed = r.bool()?;

        *self = Self {
            regs,
            step_cycles: 0,
            total_cycles,
            nmi_level,
            irq_level,
            nmi_pending,
            poll_i,
            reset_pending,
            jammed,
        };
        Ok(())
    }
}

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.regs.pc.into()),
            "a" => Some(self.regs.a.into()),
            "x" => Some(self.regs.x.into()),
            "y" => Some(self.regs.y.into()),
            "s" | "sp" => Some(self.regs.s.into()),
            "p" | "status" => Some(self.regs.p.0.into()),
            "flags.c" => Some(self.regs.p.is_set(C).into()),
            "flags.z" => Some(self.regs.p.is_set(Z).into()),
            "flags.i" => Some(self.regs.p.is_set(I).into()),
            "flags.d" => Some(self.regs.p.is_set(D).into()),
            "flags.b" => Some(self.regs.p.is_set(B).into()),
            "flags.v" => Some(self.regs.p.is_set(V).into()),
            "flags.n" => Some(self.regs.p.is_set(N).into()),
            "cycle" => Some(self.total_cycles.into()),
            "jammed" | "halted" => Some(self.jammed.into()),
            "nmi_pending" => Some(self.nmi_pending.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "a", "x", "y", "s", "p", "flags.c", "flags.z", "flags.i", "flags.d", "flags.b",
            "flags.v", "flags.n", "cycle", "jammed", "nmi_pending",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    fn cpu_at(bus: &mut SimpleBus, pc: u16, program: &[u8]) -> Mos6502 {
        bus.load(pc, program);
        let mut cpu = Mos6502::new();
        cpu.set_pc(pc);
        cpu
    }

    #[test]
    fn power_on_runs_reset_sequence() {
        let mut bus = SimpleBus::new();
        bus.load(RESET_VECTOR, &[0x34, 0x12]);
        let mut cpu = Mos6502::new();

        assert_eq!(cpu.step(&mut bus), RESET_CYCLES);
        assert_eq!(cpu.regs.pc, 0x1234);
        assert_eq!(cpu.regs.s, 0xFD);
        assert!(cpu.regs.p.is_set(I));
        assert!(bus.writes().is_empty(), "reset must not write the stack");
    }

    #[test]
    fn decimal_adc() {
        let mut bus = SimpleBus::new();
        // SED; CLC; LDA #$19; ADC #$28
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0xF8, 0x18, 0xA9, 0x19, 0x69, 0x28]);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.regs.a, 0x47);
        assert!(!cpu.regs.p.is_set(C));
    }

    #[test]
    fn decimal_adc_carries_out() {
        let mut bus = SimpleBus::new();
        // SED; SEC; LDA #$99; ADC #$00
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0xF8, 0x38, 0xA9, 0x99, 0x69, 0x00]);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.regs.p.is_set(C));
        // Z comes from the binary sum $9A.
        assert!(!cpu.regs.p.is_set(Z));
    }

    #[test]
    fn decimal_sbc() {
        let mut bus = SimpleBus::new();
        // SED; SEC; LDA #$42; SBC #$13
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0xF8, 0x38, 0xA9, 0x42, 0xE9, 0x13]);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.regs.a, 0x29);
        assert!(cpu.regs.p.is_set(C));
    }

    #[test]
    fn jam_halts_until_reset() {
        let mut bus = SimpleBus::new();
        bus.load(RESET_VECTOR, &[0x00, 0x03]);
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0x02]);

        assert_eq!(cpu.step(&mut bus), 2);
        assert!(cpu.is_jammed());
        assert_eq!(cpu.regs.pc, 0x0200);
        assert_eq!(cpu.step(&mut bus), 1);

        cpu.set_interrupt_lines(InterruptLines { irq: false, nmi: true });
        assert_eq!(cpu.step(&mut bus), 1, "interrupts are ignored while jammed");

        cpu.reset();
        assert_eq!(cpu.step(&mut bus), RESET_CYCLES);
        assert!(!cpu.is_jammed());
        assert_eq!(cpu.regs.pc, 0x0300);
    }

    #[test]
    fn state_round_trip_preserves_registers() {
        let mut bus = SimpleBus::new();
        let mut cpu = cpu_at(&mut bus, 0x0200, &[0xA9, 0x80, 0xAA]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);

        let mut w = StateWriter::new();
        cpu.save_state(&mut w);
        let bytes = w.into_bytes();

        let mut restored = Mos6502::new();
        let mut r = StateReader::new(&bytes);
        restored.load_state(&mut r).expect("load");
        r.finish().expect("no trailing bytes");
        assert_eq!(restored.regs, cpu.regs);
        assert_eq!(restored.total_cycles(), 4);
        assert!(!restored.reset_pending());
    }

    #[test]
    fn observable_paths_resolve() {
        let cpu = Mos6502::new();
        for path in cpu.query_paths() {
            assert!(cpu.query(path).is_some(), "{path}");
        }
    }
}
