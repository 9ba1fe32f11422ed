//! MOS 6526 Complex Interface Adapter (CIA).
//!
//! Two identical CIAs in the C64:
//! - CIA1 ($DC00-$DC0F): keyboard scanning, joysticks, timers → IRQ
//! - CIA2 ($DD00-$DD0F): video bank select, serial bus, timers → NMI
//!
//! # Registers
//!
//! | Reg | Read               | Write                |
//! |-----|--------------------|----------------------|
//! | $x0 | Port A pins        | Port A data          |
//! | $x1 | Port B pins        | Port B data          |
//! | $x2 | Port A DDR         | Port A DDR           |
//! | $x3 | Port B DDR         | Port B DDR           |
//! | $x4 | Timer A low (cnt)  | Timer A low (latch)  |
//! | $x5 | Timer A high (cnt) | Timer A high (latch) |
//! | $x6 | Timer B low (cnt)  | Timer B low (latch)  |
//! | $x7 | Timer B high (cnt) | Timer B high (latch) |
//! | $x8 | TOD 10ths          | TOD/alarm 10ths      |
//! | $x9 | TOD seconds        | TOD/alarm seconds    |
//! | $xA | TOD minutes        | TOD/alarm minutes    |
//! | $xB | TOD hours          | TOD/alarm hours      |
//! | $xC | Serial data        | Serial data          |
//! | $xD | ICR (read/clear)   | ICR mask set/clear   |
//! | $xE | Control A          | Control A            |
//! | $xF | Control B          | Control B            |
//!
//! Register writes are queued with their bus cycle and applied when the
//! chip's own cycle reaches them. Reads of the timers, TOD and ICR are
//! projected to the read's cycle; side effects of reads (ICR clear, TOD
//! latch) are queued the same way as writes.

mod timer;
mod tod;

use emu_core::{
    Chip, DmaView, Observable, RegisterWrite, SaveState, StateError, StateReader, StateWriter,
    Value, WriteQueue,
};

pub use timer::Timer;
pub use tod::{PM, TimeOfDay, TodTime};

/// ICR: timer A underflow.
pub const ICR_TA: u8 = 0x01;
/// ICR: timer B underflow.
pub const ICR_TB: u8 = 0x02;
/// ICR: TOD alarm.
pub const ICR_ALARM: u8 = 0x04;
/// ICR: serial port byte complete.
pub const ICR_SP: u8 = 0x08;
/// ICR: FLAG pin.
pub const ICR_FLAG: u8 = 0x10;

/// CRA bit 5: timer A counts CNT transitions instead of cycles.
const CRA_INMODE: u8 = 0x20;
/// CRA bit 6: serial port is an output.
const CRA_SPMODE: u8 = 0x40;
/// CRB bit 7: TOD writes go to the alarm.
const CRB_ALARM: u8 = 0x80;

// Queued side effects of register reads, kept outside the register range.
const OP_ACK_ICR: u16 = 0x100;
const OP_TOD_LATCH: u16 = 0x101;
const OP_TOD_UNLATCH: u16 = 0x102;

/// MOS 6526 CIA.
#[derive(Debug, Clone)]
pub struct Cia {
    label: &'static str,
    cycles: u64,
    writes: WriteQueue,

    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    /// Levels driven onto port A by the outside world.
    external_a: u8,
    /// Levels driven onto port B by the outside world.
    external_b: u8,
    /// Keyboard matrix: bit `r` of entry `c` set when the key at column
    /// `c` (port A) and row `r` (port B) is down.
    matrix: [u8; 8],

    timer_a: Timer,
    timer_b: Timer,

    icr_flags: u8,
    icr_mask: u8,

    tod: TimeOfDay,

    sdr: u8,
    /// Timer A underflows left before the shift register empties.
    sdr_shifts: u8,
}

impl Cia {
    /// A CIA at power-on. `tod_tick_cycles` is the number of CPU cycles
    /// per TOD tenth of a second.
    #[must_use]
    pub fn new(label: &'static str, tod_tick_cycles: u32) -> Self {
        Self {
            label,
            cycles: 0,
            writes: WriteQueue::new(),
            port_a: 0xFF,
            port_b: 0xFF,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            matrix: [0; 8],
            timer_a: Timer::new(),
            timer_b: Timer::new(),
            icr_flags: 0,
            icr_mask: 0,
            tod: TimeOfDay::new(tod_tick_cycles),
            sdr: 0,
            sdr_shifts: 0,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Port A as driven by this chip: output bits from the data
    /// register, inputs pulled high.
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | !self.ddr_a
    }

    /// Port B as driven by this chip.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        (self.port_b & self.ddr_b) | !self.ddr_b
    }

    /// Set the levels external devices drive onto port A (joystick 2 on
    /// CIA1, serial bus lines on CIA2). Low bits pull the pins low.
    pub fn set_port_a_input(&mut self, value: u8) {
        self.external_a = value;
    }

    /// Set the levels external devices drive onto port B.
    pub fn set_port_b_input(&mut self, value: u8) {
        self.external_b = value;
    }

    /// Replace the keyboard matrix wired between the ports.
    pub fn set_key_matrix(&mut self, matrix: [u8; 8]) {
        self.matrix = matrix;
    }

    /// Pulse the FLAG input.
    pub fn trigger_flag(&mut self) {
        self.icr_flags |= ICR_FLAG;
    }

    #[must_use]
    pub fn timer_a(&self) -> &Timer {
        &self.timer_a
    }

    #[must_use]
    pub fn timer_b(&self) -> &Timer {
        &self.timer_b
    }

    #[must_use]
    pub fn tod(&self) -> &TimeOfDay {
        &self.tod
    }

    #[must_use]
    pub fn icr_flags(&self) -> u8 {
        self.icr_flags
    }

    #[must_use]
    pub fn icr_mask(&self) -> u8 {
        self.icr_mask
    }

    // =========================================================================
    // Cycle stepping
    // =========================================================================

    /// Run one cycle: apply writes due now, then clock timers and TOD.
    fn step_cycle(&mut self) {
        while let Some(write) = self.writes.pop_due(self.cycles) {
            self.apply(write);
        }

        let count_a = self.timer_a.control & CRA_INMODE == 0;
        let underflow_a = self.timer_a.clock(count_a);
        if underflow_a {
            self.icr_flags |= ICR_TA;
            self.shift_serial();
        }

        let count_b = match (self.timer_b.control >> 5) & 0x03 {
            0 => true,
            // CNT is held high, so "TA underflow while CNT high" is just
            // TA underflow.
            2 | 3 => underflow_a,
            _ => false,
        };
        if self.timer_b.clock(count_b) {
            self.icr_flags |= ICR_TB;
        }

        if self.tod.clock() {
            self.icr_flags |= ICR_ALARM;
        }

        self.cycles += 1;
    }

    fn shift_serial(&mut self) {
        if self.timer_a.control & CRA_SPMODE == 0 || self.sdr_shifts == 0 {
            return;
        }
        // Two underflows per bit.
        self.sdr_shifts -= 1;
        if self.sdr_shifts == 0 {
            self.icr_flags |= ICR_SP;
        }
    }

    fn run_to(&mut self, cycle: u64) {
        while self.cycles < cycle {
            self.step_cycle();
        }
    }

    /// A copy of this chip advanced to `at`, for reads that depend on the
    /// exact cycle.
    fn projected(&self, at: u64) -> Self {
        let mut view = self.clone();
        view.run_to(at);
        view
    }

    fn apply(&mut self, write: RegisterWrite) {
        match write.offset {
            OP_ACK_ICR => self.icr_flags = 0,
            OP_TOD_LATCH => self.tod.latch(),
            OP_TOD_UNLATCH => self.tod.unlatch(),
            offset => self.write_now(offset as u8, write.value),
        }
    }

    fn write_now(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => self.timer_a.write_latch_lo(value),
            0x05 => self.timer_a.write_latch_hi(value),
            0x06 => self.timer_b.write_latch_lo(value),
            0x07 => self.timer_b.write_latch_hi(value),
            r @ 0x08..=0x0B => {
                let alarm = self.timer_b.control & CRB_ALARM != 0;
                self.tod.write(usize::from(r - 0x08), value, alarm);
            }
            0x0C => {
                self.sdr = value;
                if self.timer_a.control & CRA_SPMODE != 0 {
                    self.sdr_shifts = 16;
                }
            }
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            0x0E => self.timer_a.write_control(value),
            _ => self.timer_b.write_control(value),
        }
    }

    // =========================================================================
    // Register reads
    // =========================================================================

    fn port_a_pins(&self) -> u8 {
        // Rows pulled low by port B select columns through pressed keys.
        let rows = self.port_b_output() & self.external_b;
        let mut columns = 0xFF;
        for (col, &keys) in self.matrix.iter().enumerate() {
            if keys & !rows != 0 {
                columns &= !(1 << col);
            }
        }
        (self.port_a & self.ddr_a) | (self.external_a & columns & !self.ddr_a)
    }

    fn port_b_pins(&self) -> u8 {
        let columns = self.port_a_output() & self.external_a;
        let mut rows = 0xFF;
        for (col, &keys) in self.matrix.iter().enumerate() {
            if columns & (1 << col) == 0 {
                rows &= !keys;
            }
        }
        let mut value = (self.port_b & self.ddr_b) | (self.external_b & rows & !self.ddr_b);
        if self.timer_a.control & timer::PB_ON != 0 {
            value = (value & !0x40) | (u8::from(self.timer_a.output()) << 6);
        }
        if self.timer_b.control & timer::PB_ON != 0 {
            value = (value & !0x80) | (u8::from(self.timer_b.output()) << 7);
        }
        value
    }

    fn icr_value(&self) -> u8 {
        let any = if self.irq_asserted() { 0x80 } else { 0x00 };
        self.icr_flags | any
    }

    fn register_value(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => self.port_a_pins(),
            0x01 => self.port_b_pins(),
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a.counter as u8,
            0x05 => (self.timer_a.counter >> 8) as u8,
            0x06 => self.timer_b.counter as u8,
            0x07 => (self.timer_b.counter >> 8) as u8,
            r @ 0x08..=0x0B => self.tod.read(usize::from(r - 0x08)),
            0x0C => self.sdr,
            0x0D => self.icr_value(),
            0x0E => self.timer_a.control,
            _ => self.timer_b.control,
        }
    }
}

impl Chip for Cia {
    fn tick(&mut self, cycles: u32, _dma: &dyn DmaView) {
        self.run_to(self.cycles + u64::from(cycles));
    }

    fn reset(&mut self) {
        let cycles = self.cycles;
        let tick_cycles = self.tod.tick_cycles;
        let external = (self.external_a, self.external_b, self.matrix);
        *self = Self::new(self.label, tick_cycles);
        self.cycles = cycles;
        (self.external_a, self.external_b, self.matrix) = external;
        log::debug!("{} reset", self.label);
    }

    fn read_register(&mut self, offset: u16, at: u64) -> u8 {
        let reg = (offset & 0x0F) as u8;
        let value = if at > self.cycles {
            self.projected(at).register_value(reg)
        } else {
            self.register_value(reg)
        };
        match reg {
            0x08 => self.writes.push(at, OP_TOD_UNLATCH, 0),
            0x0B => self.writes.push(at, OP_TOD_LATCH, 0),
            0x0D => self.writes.push(at, OP_ACK_ICR, 0),
            _ => {}
        }
        value
    }

    fn write_register(&mut self, offset: u16, value: u8, at: u64) {
        self.writes.push(at, offset & 0x0F, value);
    }

    fn peek_register(&self, offset: u16) -> u8 {
        self.register_value((offset & 0x0F) as u8)
    }

    fn irq_asserted(&self) -> bool {
        self.icr_flags & self.icr_mask & 0x1F != 0
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

fn put_timer(w: &mut StateWriter, timer: &Timer) {
    w.put_u16(timer.counter);
    w.put_u16(timer.latch);
    w.put_u8(timer.control);
    w.put_bool(timer.force_load);
    w.put_bool(timer.toggle);
    w.put_bool(timer.pulse);
}

fn get_timer(r: &mut StateReader<'_>) -> Result<Timer, StateError> {
    Ok(Timer {
        counter: r.u16()?,
        latch: r.u16()?,
        control: r.u8()?,
        force_load: r.bool()?,
        toggle: r.bool()?,
        pulse: r.bool()?,
    })
}

impl SaveState for Cia {
    fn save_state(&self, w: &mut StateWriter) {
        w.put_u64(self.cycles);
        self.writes.save(w);
        for byte in [
            self.port_a,
            self.port_b,
            self.ddr_a,
            self.ddr_b,
            self.external_a,
            self.external_b,
        ] {
            w.put_u8(byte);
        }
        w.put_bytes(&self.matrix);
        put_timer(w, &self.timer_a);
        put_timer(w, &self.timer_b);
        w.put_u8(self.icr_flags);
        w.put_u8(self.icr_mask);
        w.put_bytes(&self.tod.time);
        w.put_bytes(&self.tod.alarm);
        w.put_bool(self.tod.latch.is_some());
        w.put_bytes(&self.tod.latch.unwrap_or_default());
        w.put_bool(self.tod.halted);
        w.put_u32(self.tod.tick_cycles);
        w.put_u32(self.tod.countdown);
        w.put_u8(self.sdr);
        w.put_u8(self.sdr_shifts);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut cia = Self::new(self.label, 1);
        cia.cycles = r.u64()?;
        cia.writes.load(r)?;
        cia.port_a = r.u8()?;
        cia.port_b = r.u8()?;
        cia.ddr_a = r.u8()?;
        cia.ddr_b = r.u8()?;
        cia.external_a = r.u8()?;
        cia.external_b = r.u8()?;
        cia.matrix = r.array()?;
        cia.timer_a = get_timer(r)?;
        cia.timer_b = get_timer(r)?;
        cia.icr_flags = r.u8()?;
        cia.icr_mask = r.u8()?;
        cia.tod.time = r.array()?;
        cia.tod.alarm = r.array()?;
        let latched = r.bool()?;
        let latch: TodTime = r.array()?;
        cia.tod.latch = latched.then_some(latch);
        cia.tod.halted = r.bool()?;
        cia.tod.tick_cycles = r.u32()?;
        cia.tod.countdown = r.u32()?;
        if cia.tod.tick_cycles == 0 || cia.tod.countdown == 0 {
            return Err(StateError::Invalid("TOD period is zero"));
        }
        cia.sdr = r.u8()?;
        cia.sdr_shifts = r.u8()?;
        *self = cia;
        Ok(())
    }
}

impl Observable for Cia {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "timer_a" => Some(self.timer_a.counter.into()),
            "timer_a.latch" => Some(self.timer_a.latch.into()),
            "timer_b" => Some(self.timer_b.counter.into()),
            "timer_b.latch" => Some(self.timer_b.latch.into()),
            "cra" => Some(self.timer_a.control.into()),
            "crb" => Some(self.timer_b.control.into()),
            "icr.flags" => Some(self.icr_flags.into()),
            "icr.mask" => Some(self.icr_mask.into()),
            "irq" => Some(self.irq_asserted().into()),
            "port_a" => Some(self.port_a_pins().into()),
            "port_b" => Some(self.port_b_pins().into()),
            "tod" => {
                let [tenths, s, m, h] = self.tod.time;
                let pm = if h & PM != 0 { "PM" } else { "AM" };
                Some(Value::String(format!(
                    "{:02X}:{m:02X}:{s:02X}.{tenths:X} {pm}",
                    h & 0x1F
                )))
            }
            "cycles" => Some(self.cycles.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "timer_a",
            "timer_a.latch",
            "timer_b",
            "timer_b.latch",
            "cra",
            "crb",
            "icr.flags",
            "icr.mask",
            "irq",
            "port_a",
            "port_b",
            "tod",
            "cycles",
        ]
    }
}
