//! GCR floppy disk controller.
//!
//! A memory-mapped chip that owns a bit-level read/write head over a raw
//! GCR surface. It replaces the separate drive computer: the host CPU
//! talks to the head directly through eight registers.
//!
//! # Registers
//!
//! | Reg | Read                      | Write                        |
//! |-----|---------------------------|------------------------------|
//! | $x0 | CONTROL                   | CONTROL                      |
//! | $x1 | STATUS                    | -                            |
//! | $x2 | DATA (last byte read)     | DATA (next byte to write)    |
//! | $x3 | HEAD (half-track)         | bit 0 step in, bit 1 out     |
//! | $x4 | IRQ flags (read clears)   | -                            |
//! | $x5-$x7 | $FF                   | -                            |
//!
//! CONTROL: bit 0 motor, 1 write mode, 2 LED, 3-4 speed zone, 5 byte-ready
//! IRQ enable, 6 handshake.
//!
//! STATUS: bit 7 sync (1 = head over a sync mark), 6 byte ready, 4 write
//! protect, 3 disk present, 0 motor.
//!
//! The head runs on a 16 MHz reference clock. One bit cell lasts
//! `4 * (16 - zone)` reference ticks; CPU cycles are converted to cells
//! with an exact rational accumulator.

mod disk;
pub mod gcr;

use std::collections::VecDeque;

use emu_core::{
    BusStall, Chip, DmaView, Observable, RegisterWrite, SaveState, StateError, StateReader,
    StateWriter, Value, WriteQueue,
};

pub use disk::{BLANK_TRACK_BYTES, Disk, DiskError, HALF_TRACKS, MAX_TRACK_BYTES};

/// Reference clock of the bit-cell divider.
pub const REFERENCE_HZ: u64 = 16_000_000;

pub const CTRL_MOTOR: u8 = 0x01;
pub const CTRL_WRITE: u8 = 0x02;
pub const CTRL_LED: u8 = 0x04;
pub const CTRL_IRQ_ENABLE: u8 = 0x20;
pub const CTRL_HANDSHAKE: u8 = 0x40;

pub const STATUS_SYNC: u8 = 0x80;
pub const STATUS_BYTE_READY: u8 = 0x40;
pub const STATUS_WRITE_PROTECT: u8 = 0x10;
pub const STATUS_DISK: u8 = 0x08;
pub const STATUS_MOTOR: u8 = 0x01;

pub const IRQ_BYTE: u8 = 0x01;
pub const IRQ_SYNC: u8 = 0x02;

/// Half-track the head parks on at power-on (track 18).
pub const PARK_HALF_TRACK: u8 = 34;

/// Consecutive one bits that make a sync mark.
const SYNC_BITS: u8 = 10;

/// Longest bus stall a handshake read may request.
const HANDSHAKE_LIMIT_CYCLES: u32 = 1024;

// Queued side effects of register reads.
const OP_ACK_BYTE: u16 = 0x100;
const OP_ACK_IRQ: u16 = 0x101;

/// One bit laid down by the write head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flux {
    half_track: u8,
    position: usize,
    bit: bool,
}

/// Everything that moves with the clock. Cheap to clone for projected
/// reads; the surface itself lives in the controller.
#[derive(Debug, Clone)]
struct Head {
    cycles: u64,
    writes: WriteQueue,
    cpu_hz: u64,

    control: u8,
    data_out: u8,
    half_track: u8,

    /// Reference ticks accumulated, scaled by the CPU clock.
    phase: u64,
    bit_position: usize,
    ones_run: u8,
    /// A sync mark has been seen since the last head or mode change, so
    /// bits are grouped into bytes.
    framed: bool,
    shift: u8,
    bits: u8,
    data_in: u8,
    byte_ready: bool,
    irq_flags: u8,

    flux_out: Vec<Flux>,
}

impl Head {
    fn new(cpu_hz: u64) -> Self {
        Self {
            cycles: 0,
            writes: WriteQueue::new(),
            cpu_hz,
            control: 0,
            data_out: 0,
            half_track: PARK_HALF_TRACK,
            phase: 0,
            bit_position: 0,
            ones_run: 0,
            framed: false,
            shift: 0,
            bits: 0,
            data_in: 0,
            byte_ready: false,
            irq_flags: 0,
            flux_out: Vec::new(),
        }
    }

    fn zone(&self) -> u8 {
        (self.control >> 3) & 0x03
    }

    fn motor_on(&self) -> bool {
        self.control & CTRL_MOTOR != 0
    }

    fn writing(&self) -> bool {
        self.control & CTRL_WRITE != 0
    }

    fn in_sync(&self) -> bool {
        self.ones_run >= SYNC_BITS
    }

    /// Threshold of `phase` for one bit cell in the current zone.
    fn cell_period(&self) -> u64 {
        self.cpu_hz * 4 * (16 - u64::from(self.zone()))
    }

    fn step_cycle(&mut self, disk: Option<&Disk>) {
        while let Some(write) = self.writes.pop_due(self.cycles) {
            self.apply(write, disk);
        }

        if self.motor_on() {
            self.phase += REFERENCE_HZ;
            let period = self.cell_period();
            while self.phase >= period {
                self.phase -= period;
                self.bit_cell(disk);
            }
        }

        self.cycles += 1;
    }

    fn run_to(&mut self, cycle: u64, disk: Option<&Disk>) {
        while self.cycles < cycle {
            self.step_cycle(disk);
        }
    }

    fn bit_cell(&mut self, disk: Option<&Disk>) {
        let track_bits = disk.map_or(BLANK_TRACK_BYTES * 8, |d| d.track_bits(self.half_track));

        if self.writing() {
            self.flux_out.push(Flux {
                half_track: self.half_track,
                position: self.bit_position,
                bit: self.shift & 0x80 != 0,
            });
            self.shift <<= 1;
            self.bits += 1;
            if self.bits == 8 {
                self.bits = 0;
                self.shift = self.data_out;
                self.set_byte_ready();
            }
        } else {
            let bit = disk.is_some_and(|d| d.bit(self.half_track, self.bit_position));
            self.read_bit(bit);
        }

        self.bit_position = (self.bit_position + 1) % track_bits;
    }

    fn read_bit(&mut self, bit: bool) {
        if bit {
            self.ones_run = self.ones_run.saturating_add(1);
        } else {
            self.ones_run = 0;
        }

        if self.in_sync() {
            if self.ones_run == SYNC_BITS {
                self.irq_flags |= IRQ_SYNC;
            }
            self.framed = true;
            self.bits = 0;
            return;
        }
        if !self.framed {
            return;
        }

        self.shift = (self.shift << 1) | u8::from(bit);
        self.bits += 1;
        if self.bits == 8 {
            self.bits = 0;
            self.data_in = self.shift;
            self.set_byte_ready();
        }
    }

    fn set_byte_ready(&mut self) {
        self.byte_ready = true;
        self.irq_flags |= IRQ_BYTE;
    }

    fn apply(&mut self, write: RegisterWrite, disk: Option<&Disk>) {
        match write.offset {
            OP_ACK_BYTE => {
                self.byte_ready = false;
                self.irq_flags &= !IRQ_BYTE;
            }
            OP_ACK_IRQ => self.irq_flags = 0,
            0 => self.write_control(write.value),
            2 => {
                self.data_out = write.value;
                self.byte_ready = false;
                self.irq_flags &= !IRQ_BYTE;
            }
            3 => self.step_head(write.value, disk),
            _ => {}
        }
    }

    fn write_control(&mut self, value: u8) {
        let was_writing = self.writing();
        self.control = value;
        if self.writing() != was_writing {
            self.bits = 0;
            self.ones_run = 0;
            self.framed = false;
            if self.writing() {
                self.shift = self.data_out;
            }
        }
    }

    fn step_head(&mut self, value: u8, disk: Option<&Disk>) {
        let target = if value & 0x01 != 0 {
            self.half_track.saturating_add(1).min(HALF_TRACKS - 1)
        } else if value & 0x02 != 0 {
            self.half_track.saturating_sub(1)
        } else {
            return;
        };
        if target == self.half_track {
            return;
        }
        log::trace!("disk head {} -> {target}", self.half_track);
        self.half_track = target;
        self.framed = false;
        let track_bits = disk.map_or(BLANK_TRACK_BYTES * 8, |d| d.track_bits(target));
        self.bit_position %= track_bits;
    }

    fn status(&self, disk: Option<&Disk>) -> u8 {
        let mut status = 0;
        if self.in_sync() {
            status |= STATUS_SYNC;
        }
        if self.byte_ready {
            status |= STATUS_BYTE_READY;
        }
        if let Some(d) = disk {
            status |= STATUS_DISK;
            if d.write_protected {
                status |= STATUS_WRITE_PROTECT;
            }
        }
        if self.motor_on() {
            status |= STATUS_MOTOR;
        }
        status
    }

    fn register_value(&self, reg: u8, disk: Option<&Disk>) -> u8 {
        match reg & 0x07 {
            0 => self.control,
            1 => self.status(disk),
            2 => self.data_in,
            3 => self.half_track,
            4 => self.irq_flags,
            _ => 0xFF,
        }
    }
}

/// GCR disk controller chip.
#[derive(Debug, Clone)]
pub struct DiskController {
    head: Head,
    disk: Option<Disk>,
    stalls: VecDeque<BusStall>,
}

impl DiskController {
    /// A controller with no disk, for a host CPU clocked at `cpu_hz`.
    #[must_use]
    pub fn new(cpu_hz: u32) -> Self {
        Self {
            head: Head::new(u64::from(cpu_hz.max(1))),
            disk: None,
            stalls: VecDeque::new(),
        }
    }

    pub fn insert_disk(&mut self, disk: Disk) {
        log::debug!("disk inserted (write protect {})", disk.write_protected);
        self.disk = Some(disk);
    }

    pub fn eject_disk(&mut self) -> Option<Disk> {
        let disk = self.disk.take();
        if disk.is_some() {
            log::debug!("disk ejected");
        }
        disk
    }

    #[must_use]
    pub fn disk(&self) -> Option<&Disk> {
        self.disk.as_ref()
    }

    #[must_use]
    pub fn half_track(&self) -> u8 {
        self.head.half_track
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.head.motor_on()
    }

    #[must_use]
    pub fn led_on(&self) -> bool {
        self.head.control & CTRL_LED != 0
    }

    #[must_use]
    pub fn bit_position(&self) -> usize {
        self.head.bit_position
    }

    fn run_to(&mut self, cycle: u64) {
        while self.head.cycles < cycle {
            self.head.step_cycle(self.disk.as_ref());
            self.flush_flux();
        }
    }

    fn flush_flux(&mut self) {
        if self.head.flux_out.is_empty() {
            return;
        }
        match self.disk.as_mut() {
            Some(disk) if !disk.write_protected => {
                for flux in self.head.flux_out.drain(..) {
                    disk.write_bit(flux.half_track, flux.position, flux.bit);
                }
            }
            _ => self.head.flux_out.clear(),
        }
    }

    fn projected(&self, at: u64) -> Head {
        let mut head = self.head.clone();
        head.run_to(at, self.disk.as_ref());
        head
    }

    /// Handshake read: run a copy forward until the next byte is ready
    /// and report how many cycles that took.
    fn wait_for_byte(&self, mut head: Head) -> Option<(u8, u32)> {
        for waited in 1..=HANDSHAKE_LIMIT_CYCLES {
            head.step_cycle(self.disk.as_ref());
            if head.byte_ready {
                return Some((head.data_in, waited));
            }
        }
        None
    }
}

impl Chip for DiskController {
    fn tick(&mut self, cycles: u32, _dma: &dyn DmaView) {
        self.run_to(self.head.cycles + u64::from(cycles));
    }

    fn reset(&mut self) {
        let cycles = self.head.cycles;
        self.head = Head::new(self.head.cpu_hz);
        self.head.cycles = cycles;
        self.stalls.clear();
        log::debug!("disk controller reset");
    }

    fn read_register(&mut self, offset: u16, at: u64) -> u8 {
        let reg = (offset & 0x07) as u8;
        let head = if at > self.head.cycles {
            self.projected(at)
        } else {
            self.head.clone()
        };

        match reg {
            2 if !head.byte_ready && head.control & CTRL_HANDSHAKE != 0 && !head.writing() => {
                match self.wait_for_byte(head.clone()) {
                    Some((byte, waited)) => {
                        log::trace!("disk handshake stall {waited} cycles at {at}");
                        self.stalls.push_back(BusStall::new(at, waited));
                        self.head.writes.push(at + u64::from(waited), OP_ACK_BYTE, 0);
                        byte
                    }
                    None => head.data_in,
                }
            }
            2 => {
                self.head.writes.push(at, OP_ACK_BYTE, 0);
                head.data_in
            }
            4 => {
                self.head.writes.push(at, OP_ACK_IRQ, 0);
                head.irq_flags
            }
            _ => head.register_value(reg, self.disk.as_ref()),
        }
    }

    fn write_register(&mut self, offset: u16, value: u8, at: u64) {
        self.head.writes.push(at, offset & 0x07, value);
    }

    fn peek_register(&self, offset: u16) -> u8 {
        self.head.register_value((offset & 0x07) as u8, self.disk.as_ref())
    }

    fn irq_asserted(&self) -> bool {
        self.head.irq_flags & IRQ_BYTE != 0 && self.head.control & CTRL_IRQ_ENABLE != 0
    }

    fn take_stall(&mut self) -> Option<BusStall> {
        self.stalls.pop_front()
    }

    fn cycles(&self) -> u64 {
        self.head.cycles
    }
}

impl SaveState for DiskController {
    fn save_state(&self, w: &mut StateWriter) {
        let head = &self.head;
        w.put_u64(head.cycles);
        head.writes.save(w);
        w.put_u64(head.cpu_hz);
        w.put_u8(head.control);
        w.put_u8(head.data_out);
        w.put_u8(head.half_track);
        w.put_u64(head.phase);
        w.put_u32(head.bit_position as u32);
        w.put_u8(head.ones_run);
        w.put_bool(head.framed);
        w.put_u8(head.shift);
        w.put_u8(head.bits);
        w.put_u8(head.data_in);
        w.put_bool(head.byte_ready);
        w.put_u8(head.irq_flags);

        w.put_u32(self.stalls.len() as u32);
        for stall in &self.stalls {
            w.put_u64(stall.from_cycle);
            w.put_u32(stall.duration);
        }

        w.put_bool(self.disk.is_some());
        if let Some(disk) = &self.disk {
            w.put_bool(disk.write_protected);
            for track in disk.tracks() {
                w.put_blob(track);
            }
        }
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut head = Head::new(1);
        head.cycles = r.u64()?;
        head.writes.load(r)?;
        head.cpu_hz = r.u64()?;
        if head.cpu_hz == 0 {
            return Err(StateError::Invalid("disk controller clock is zero"));
        }
        head.control = r.u8()?;
        head.data_out = r.u8()?;
        head.half_track = r.u8()?;
        if head.half_track >= HALF_TRACKS {
            return Err(StateError::Invalid("disk head beyond last half-track"));
        }
        head.phase = r.u64()?;
        if head.phase >= head.cell_period() {
            return Err(StateError::Invalid("disk bit-cell phase out of range"));
        }
        head.bit_position = r.u32()? as usize;
        head.ones_run = r.u8()?;
        head.framed = r.bool()?;
        head.shift = r.u8()?;
        head.bits = r.u8()?;
        if head.bits >= 8 {
            return Err(StateError::Invalid("disk shift count out of range"));
        }
        head.data_in = r.u8()?;
        head.byte_ready = r.bool()?;
        head.irq_flags = r.u8()?;

        let count = r.u32()?;
        let mut stalls = VecDeque::new();
        for _ in 0..count {
            let from_cycle = r.u64()?;
            let duration = r.u32()?;
            stalls.push_back(BusStall::new(from_cycle, duration));
        }

        let disk = if r.bool()? {
            let mut disk = Disk::blank(r.bool()?);
            for half_track in 0..HALF_TRACKS {
                disk.set_track(half_track, r.blob()?.to_vec())
                    .map_err(|_| StateError::Invalid("disk track too long"))?;
            }
            Some(disk)
        } else {
            None
        };

        let track_bits = disk
            .as_ref()
            .map_or(BLANK_TRACK_BYTES * 8, |d| d.track_bits(head.half_track));
        if head.bit_position >= track_bits {
            return Err(StateError::Invalid("disk bit position beyond track end"));
        }

        self.head = head;
        self.stalls = stalls;
        self.disk = disk;
        Ok(())
    }
}

impl Observable for DiskController {
    fn query(&self, path: &str) -> Option<Value> {
        let head = &self.head;
        match path {
            "half_track" => Some(head.half_track.into()),
            "track" => Some((head.half_track / 2 + 1).into()),
            "motor" => Some(head.motor_on().into()),
            "led" => Some(self.led_on().into()),
            "write_mode" => Some(head.writing().into()),
            "zone" => Some(head.zone().into()),
            "sync" => Some(head.in_sync().into()),
            "byte_ready" => Some(head.byte_ready.into()),
            "data" => Some(head.data_in.into()),
            "irq.flags" => Some(head.irq_flags.into()),
            "bit_position" => Some((head.bit_position as u32).into()),
            "disk" => Some(self.disk.is_some().into()),
            "write_protected" => Some(
                self.disk
                    .as_ref()
                    .is_some_and(|d| d.write_protected)
                    .into(),
            ),
            "cycles" => Some(head.cycles.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "half_track",
            "track",
            "motor",
            "led",
            "write_mode",
            "zone",
            "sync",
            "byte_ready",
            "data",
            "irq.flags",
            "bit_position",
            "disk",
            "write_protected",
            "cycles",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::NoDma;

    const ZONE_3: u8 = 3 << 3;

    /// Five sync bytes, then 0x52 and 0xAA, on the parked half-track.
    fn test_disk(write_protected: bool) -> Disk {
        let mut track = vec![0xFF; 5];
        track.extend_from_slice(&[0x52, 0xAA]);
        track.resize(64, 0x55);
        let mut disk = Disk::blank(write_protected);
        disk.set_track(PARK_HALF_TRACK, track).expect("track fits");
        disk
    }

    fn controller(control: u8) -> DiskController {
        let mut dc = DiskController::new(1_000_000);
        dc.insert_disk(test_disk(false));
        dc.write_register(0, control, 0);
        dc
    }

    #[test]
    fn byte_assembled_after_sync() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        // 52 reference ticks per cell, 16 per cycle: a cell every 3.25 cycles.
        dc.tick(155, &NoDma);
        assert_eq!(dc.peek_register(1) & STATUS_BYTE_READY, 0);
        dc.tick(1, &NoDma);
        assert_ne!(dc.peek_register(1) & STATUS_BYTE_READY, 0);
        assert_eq!(dc.peek_register(2), 0x52);

        dc.tick(182 - 156, &NoDma);
        assert_eq!(dc.peek_register(2), 0xAA);
    }

    #[test]
    fn sync_status_over_sync_mark() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        dc.tick(20, &NoDma);
        assert_eq!(dc.peek_register(1) & STATUS_SYNC, 0);
        dc.tick(80, &NoDma);
        assert_ne!(dc.peek_register(1) & STATUS_SYNC, 0);
        assert_ne!(dc.peek_register(4) & IRQ_SYNC, 0);
        dc.tick(60, &NoDma);
        assert_eq!(dc.peek_register(1) & STATUS_SYNC, 0);
    }

    #[test]
    fn motor_off_freezes_head() {
        let mut dc = controller(ZONE_3);
        dc.tick(500, &NoDma);
        assert_eq!(dc.bit_position(), 0);
        assert_eq!(dc.peek_register(1) & STATUS_MOTOR, 0);
    }

    #[test]
    fn data_read_acknowledges_byte() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3 | CTRL_IRQ_ENABLE);
        dc.tick(160, &NoDma);
        assert!(dc.irq_asserted());
        assert_eq!(dc.read_register(2, 160), 0x52);
        dc.tick(1, &NoDma);
        assert_eq!(dc.peek_register(1) & STATUS_BYTE_READY, 0);
        assert!(!dc.irq_asserted());
    }

    #[test]
    fn irq_needs_enable_bit() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        dc.tick(160, &NoDma);
        assert!(!dc.irq_asserted());
        assert_ne!(dc.peek_register(4) & IRQ_BYTE, 0);
    }

    #[test]
    fn irq_register_read_clears_flags() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        dc.tick(160, &NoDma);
        assert_eq!(dc.read_register(4, 160), IRQ_BYTE | IRQ_SYNC);
        dc.tick(1, &NoDma);
        assert_eq!(dc.peek_register(4), 0);
    }

    #[test]
    fn handshake_read_stalls_until_byte() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3 | CTRL_HANDSHAKE);
        dc.tick(100, &NoDma);
        assert_eq!(dc.read_register(2, 100), 0x52);
        assert_eq!(dc.take_stall(), Some(BusStall::new(100, 56)));
        assert_eq!(dc.take_stall(), None);

        dc.tick(56, &NoDma);
        assert_ne!(dc.peek_register(1) & STATUS_BYTE_READY, 0);
        dc.tick(1, &NoDma);
        assert_eq!(dc.peek_register(1) & STATUS_BYTE_READY, 0);
    }

    #[test]
    fn handshake_gives_up_with_motor_off() {
        let mut dc = controller(ZONE_3 | CTRL_HANDSHAKE);
        dc.tick(10, &NoDma);
        assert_eq!(dc.read_register(2, 10), 0x00);
        assert_eq!(dc.take_stall(), None);
    }

    #[test]
    fn write_mode_shifts_data_register_out() {
        let mut dc = DiskController::new(1_000_000);
        dc.insert_disk(Disk::blank(false));
        dc.write_register(2, 0x11, 0);
        dc.write_register(0, CTRL_MOTOR | CTRL_WRITE | ZONE_3, 0);
        dc.write_register(2, 0x3C, 20);
        // Eight cells take 26 cycles.
        dc.tick(52, &NoDma);

        let track = dc.disk().expect("disk").track(PARK_HALF_TRACK);
        assert_eq!(track.len(), BLANK_TRACK_BYTES);
        assert_eq!(&track[..2], &[0x11, 0x3C]);
    }

    #[test]
    fn write_protect_keeps_surface() {
        let mut dc = DiskController::new(1_000_000);
        dc.insert_disk(test_disk(true));
        dc.write_register(0, CTRL_MOTOR | CTRL_WRITE | ZONE_3, 0);
        dc.tick(100, &NoDma);
        let expected = test_disk(true);
        assert_eq!(
            dc.disk().expect("disk").track(PARK_HALF_TRACK),
            expected.track(PARK_HALF_TRACK)
        );
        assert_ne!(dc.peek_register(1) & STATUS_WRITE_PROTECT, 0);
    }

    #[test]
    fn head_steps_within_range() {
        let mut dc = DiskController::new(1_000_000);
        assert_eq!(dc.peek_register(3), PARK_HALF_TRACK);
        dc.write_register(3, 0x01, 0);
        dc.write_register(3, 0x01, 0);
        dc.tick(1, &NoDma);
        assert_eq!(dc.half_track(), PARK_HALF_TRACK + 2);
        assert_eq!(dc.query("track"), Some(Value::U8(19)));

        for i in 0..100 {
            dc.write_register(3, 0x02, 1 + i);
        }
        dc.tick(100, &NoDma);
        assert_eq!(dc.half_track(), 0);
    }

    #[test]
    fn status_reports_disk_and_motor() {
        let mut dc = DiskController::new(1_000_000);
        assert_eq!(dc.peek_register(1), 0);
        dc.insert_disk(Disk::blank(false));
        dc.write_register(0, CTRL_MOTOR | CTRL_LED, 0);
        dc.tick(1, &NoDma);
        assert_eq!(dc.peek_register(1), STATUS_DISK | STATUS_MOTOR);
        assert!(dc.led_on());
        assert_eq!(dc.peek_register(5), 0xFF);
        assert!(dc.eject_disk().is_some());
        assert_eq!(dc.peek_register(1) & STATUS_DISK, 0);
    }

    #[test]
    fn reads_project_to_their_cycle() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        dc.tick(100, &NoDma);
        assert_eq!(dc.read_register(1, 156) & STATUS_BYTE_READY, STATUS_BYTE_READY);
        assert_eq!(dc.cycles(), 100);
    }

    #[test]
    fn reset_keeps_disk_and_cycles() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3);
        dc.tick(40, &NoDma);
        dc.reset();
        assert_eq!(dc.cycles(), 40);
        assert!(dc.disk().is_some());
        assert!(!dc.motor_on());
        assert_eq!(dc.half_track(), PARK_HALF_TRACK);
    }

    #[test]
    fn state_round_trip() {
        let mut dc = controller(CTRL_MOTOR | ZONE_3 | CTRL_HANDSHAKE);
        dc.tick(90, &NoDma);
        dc.read_register(2, 90);
        dc.write_register(3, 0x01, 95);

        let mut w = StateWriter::new();
        dc.save_state(&mut w);
        let bytes = w.into_bytes();

        let mut restored = DiskController::new(1);
        let mut r = StateReader::new(&bytes);
        restored.load_state(&mut r).expect("load");
        r.finish().expect("no trailing bytes");
        let mut again = StateWriter::new();
        restored.save_state(&mut again);
        assert_eq!(again.into_bytes(), bytes);

        dc.tick(200, &NoDma);
        restored.tick(200, &NoDma);
        assert_eq!(restored.peek_register(2), dc.peek_register(2));
        assert_eq!(restored.half_track(), dc.half_track());
    }

    #[test]
    fn load_rejects_bad_head_position() {
        let dc = DiskController::new(1_000_000);
        let mut w = StateWriter::new();
        dc.save_state(&mut w);
        let mut bytes = w.into_bytes();
        // cycles (8) + empty queue (4) + cpu_hz (8) + control + data_out.
        bytes[22] = HALF_TRACKS;
        let mut restored = DiskController::new(1);
        assert!(matches!(
            restored.load_state(&mut StateReader::new(&bytes)),
            Err(StateError::Invalid(_))
        ));
    }
}
