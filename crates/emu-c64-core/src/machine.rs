//! The machine and its scheduler.
//!
//! The scheduler owns the clock. Each iteration of the main loop:
//!
//! 1. If a bus stall covers `now`, the CPU sits out: the clock jumps over
//!    the rest of the stall and every chip ticks that many cycles.
//! 2. Otherwise the CPU runs one step with the bus stamping each access.
//! 3. The clock advances by the step's cycles.
//! 4. Every chip ticks the same span, in the configured order. The video
//!    bank is sampled before the first chip ticks.
//! 5. New stall requests are collected and the interrupt lines resolved.
//! 6. A pending bank switch is installed and due external events run.
//!
//! Host controls and external events only ever act between iterations.

use std::collections::VecDeque;

use drive_gcr_controller::Disk;
use emu_core::{BusStall, Clock, Cpu, InterruptLines, Observable, Value};
use mos_6502::Mos6502;
use mos_vic_ii::VideoEvent;
use mos_sid_6581::SampleDelta;

use crate::bus::{BreakpointKind, C64Bus};
use crate::chips::{ChipId, Chips};
use crate::config::MachineConfig;
use crate::error::{BusError, ConfigError};
use crate::keyboard::{Input, JoystickState};
use crate::memory::{Cartridge, Memory};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Built, not yet run.
    Idle,
    Running,
    Paused,
    /// Powered off. Terminal.
    Stopped,
}

/// Why a run call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    CycleBudget,
    FrameComplete,
    Breakpoint(BreakpointKind, u16),
    Paused,
    Stopped,
    BusFault,
}

/// Outcome of a run call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Clock advance during the call.
    pub cycles: u64,
    pub stop: StopReason,
}

impl RunReport {
    const fn new(cycles: u64, stop: StopReason) -> Self {
        Self { cycles, stop }
    }
}

/// Something the outside world does to the machine, applied at the first
/// step boundary at or after its cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEvent {
    /// Raw 8K or 16K cartridge image.
    InsertCartridge(Vec<u8>),
    RemoveCartridge,
    InsertDisk(Disk),
    EjectDisk,
    Key { column: u8, row: u8, pressed: bool },
    /// Joystick port 1 or 2.
    Joystick { port: u8, state: JoystickState },
    Pause,
}

/// A complete machine: clock, CPU, memory, chips and input, owned by value.
#[derive(Debug, Clone)]
pub struct Machine {
    pub(crate) config: MachineConfig,
    pub(crate) clock: Clock,
    pub(crate) cpu: Mos6502,
    pub(crate) bus: C64Bus,
    pub(crate) input: Input,
    pub(crate) stalls: Vec<BusStall>,
    pub(crate) lines: InterruptLines,
    state: RunState,
    events: VecDeque<(u64, ExternalEvent)>,
    /// Execute breakpoint already reported at this PC; the next run steps
    /// over it.
    resume_from: Option<u16>,
}

impl Machine {
    /// Power on a machine. The first step runs the CPU reset sequence.
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let memory = Memory::new(&config)?;
        let chips = Chips::new(&config);
        let bus = C64Bus::new(memory, chips, config.validate_bus);

        log::info!(
            "power on: {:?}, {} layout, chip order {:?}",
            config.timing,
            config.layout.name(),
            config.chip_order
        );

        let mut machine = Self {
            config,
            clock: Clock::new(),
            cpu: Mos6502::new(),
            bus,
            input: Input::default(),
            stalls: Vec::new(),
            lines: InterruptLines::NONE,
            state: RunState::Idle,
            events: VecDeque::new(),
            resume_from: None,
        };
        machine.input.apply(&mut machine.bus.chips.cia1);
        Ok(machine)
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Current cycle.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &C64Bus {
        &self.bus
    }

    #[must_use]
    pub fn chips(&self) -> &Chips {
        &self.bus.chips
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.bus.memory
    }

    #[must_use]
    pub fn input(&self) -> &Input {
        &self.input
    }

    /// Interrupt levels presented to the CPU after the last step.
    #[must_use]
    pub fn lines(&self) -> InterruptLines {
        self.lines
    }

    /// Stall windows not yet over.
    #[must_use]
    pub fn pending_stalls(&self) -> &[BusStall] {
        &self.stalls
    }

    /// Read through the CPU's map without side effects.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        emu_core::Bus::peek(&self.bus, address)
    }

    // =========================================================================
    // Host control
    // =========================================================================

    fn set_state(&mut self, state: RunState) {
        if self.state != state {
            log::debug!("scheduler {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    pub fn pause(&mut self) {
        if matches!(self.state, RunState::Idle | RunState::Running) {
            self.set_state(RunState::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.set_state(RunState::Running);
        }
    }

    /// Power off. Nothing runs afterwards.
    pub fn power_off(&mut self) {
        if self.state != RunState::Stopped {
            log::info!("power off at cycle {}", self.clock.now());
            self.set_state(RunState::Stopped);
        }
    }

    /// Reset the CPU, chips and banking. The clock keeps counting and RAM
    /// keeps its contents apart from the configured images.
    pub fn reset(&mut self) {
        if self.state == RunState::Stopped {
            log::warn!("reset ignored: machine is powered off");
            return;
        }
        self.cpu.reset();
        for id in ChipId::ALL {
            self.bus.chips.get_mut(id).reset();
        }
        self.bus.memory.reset();
        self.input.apply(&mut self.bus.chips.cia1);
        self.stalls.clear();
        self.lines = InterruptLines::NONE;
        self.cpu.set_interrupt_lines(self.lines);
        self.resume_from = None;
        log::info!("reset at cycle {}", self.clock.now());
    }

    /// Queue `event` for the first step boundary at or after `at`.
    pub fn schedule(&mut self, at: u64, event: ExternalEvent) {
        let index = self.events.partition_point(|(t, _)| *t <= at);
        self.events.insert(index, (at, event));
    }

    pub fn add_breakpoint(&mut self, kind: BreakpointKind, address: u16) {
        self.bus.breakpoints.add(kind, address);
    }

    pub fn remove_breakpoint(&mut self, kind: BreakpointKind, address: u16) -> bool {
        self.bus.breakpoints.remove(kind, address)
    }

    pub fn clear_breakpoints(&mut self) {
        self.bus.breakpoints.clear();
    }

    /// Unmapped accesses recorded since the last call.
    pub fn take_bus_faults(&mut self) -> Vec<BusError> {
        self.bus.take_faults()
    }

    /// Buffered video events, oldest first.
    pub fn drain_video(&mut self) -> impl Iterator<Item = (u64, VideoEvent)> + '_ {
        self.bus.chips.vic.events().drain()
    }

    /// Buffered audio sample deltas, oldest first.
    pub fn drain_audio(&mut self) -> impl Iterator<Item = (u64, SampleDelta)> + '_ {
        self.bus.chips.sid.events().drain()
    }

    /// Video events dropped because the host drained too slowly.
    #[must_use]
    pub fn video_dropped(&self) -> u64 {
        self.bus.chips.vic.dropped_events()
    }

    /// Audio sample deltas dropped because the host drained too slowly.
    #[must_use]
    pub fn audio_dropped(&self) -> u64 {
        self.bus.chips.sid.dropped_events()
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Run one scheduler iteration: one CPU step or one stall span.
    pub fn step(&mut self) -> RunReport {
        match self.state {
            RunState::Stopped => return RunReport::new(0, StopReason::Stopped),
            RunState::Paused => return RunReport::new(0, StopReason::Paused),
            RunState::Idle => self.set_state(RunState::Running),
            RunState::Running => {}
        }
        let cycles = self.advance();
        let stop = self.boundary_stop().unwrap_or(StopReason::CycleBudget);
        RunReport::new(u64::from(cycles), stop)
    }

    /// Run until at least `cycles` have elapsed. The last iteration may
    /// overshoot: by up to one instruction, or by the rest of a bus stall
    /// (a disk handshake can hold the bus for up to 1024 cycles).
    pub fn run_cycles(&mut self, cycles: u64) -> RunReport {
        self.run(Some(cycles), false)
    }

    /// Run until the video chip starts a new frame.
    pub fn run_frame(&mut self) -> RunReport {
        self.run(None, true)
    }

    fn run(&mut self, budget: Option<u64>, frame: bool) -> RunReport {
        match self.state {
            RunState::Stopped => return RunReport::new(0, StopReason::Stopped),
            RunState::Paused => return RunReport::new(0, StopReason::Paused),
            RunState::Idle => self.set_state(RunState::Running),
            RunState::Running => {}
        }

        let start = self.clock.now();
        let start_frame = self.bus.chips.vic.frames();
        let stop = loop {
            if budget.is_some_and(|n| self.clock.now() - start >= n) {
                break StopReason::CycleBudget;
            }
            if let Some(stop) = self.execute_breakpoint() {
                break stop;
            }
            self.advance();
            if let Some(stop) = self.boundary_stop() {
                break stop;
            }
            if frame && self.bus.chips.vic.frames() != start_frame {
                break StopReason::FrameComplete;
            }
        };
        RunReport::new(self.clock.now() - start, stop)
    }

    fn execute_breakpoint(&mut self) -> Option<StopReason> {
        let pc = self.cpu.pc();
        if self.cpu.reset_pending() || !self.bus.breakpoints.is_execute(pc) {
            return None;
        }
        if self.resume_from == Some(pc) {
            return None;
        }
        self.resume_from = Some(pc);
        Some(StopReason::Breakpoint(BreakpointKind::Execute, pc))
    }

    fn boundary_stop(&mut self) -> Option<StopReason> {
        if let Some((kind, address)) = self.bus.take_hit() {
            return Some(StopReason::Breakpoint(kind, address));
        }
        if self.bus.has_faults() {
            return Some(StopReason::BusFault);
        }
        match self.state {
            RunState::Paused => Some(StopReason::Paused),
            RunState::Stopped => Some(StopReason::Stopped),
            RunState::Idle | RunState::Running => None,
        }
    }

    /// One scheduler iteration. Returns the cycles it covered.
    fn advance(&mut self) -> u32 {
        let now = self.clock.now();
        let stalled = self.stall_remaining(now);
        let cycles = if stalled > 0 {
            stalled
        } else {
            self.bus.begin_step(now);
            let cycles = self.cpu.step(&mut self.bus);
            self.resume_from = None;
            cycles
        };

        self.clock.advance(cycles);
        self.tick_chips(cycles);
        self.collect_stalls();
        self.lines = self.bus.chips.resolve_lines();
        self.cpu.set_interrupt_lines(self.lines);
        self.bus.memory.apply_pending_bank();
        self.process_events();
        cycles
    }

    fn stall_remaining(&mut self, now: u64) -> u32 {
        self.stalls.retain(|stall| stall.end() > now);
        self.stalls
            .iter()
            .map(|stall| stall.remaining_at(now))
            .max()
            .unwrap_or(0)
    }

    fn tick_chips(&mut self, cycles: u32) {
        let bank = self.bus.chips.video_bank();
        let view = self.bus.memory.video_view(bank);
        for &id in &self.config.chip_order {
            self.bus.chips.get_mut(id).tick(cycles, &view);
        }
    }

    fn collect_stalls(&mut self) {
        for id in ChipId::ALL {
            while let Some(stall) = self.bus.chips.get_mut(id).take_stall() {
                log::trace!(
                    "{} holds the bus for {} cycles from {}",
                    id.name(),
                    stall.duration,
                    stall.from_cycle
                );
                self.stalls.push(stall);
            }
        }
    }

    fn process_events(&mut self) {
        let now = self.clock.now();
        while self.events.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, event)) = self.events.pop_front() {
                self.apply_event(event);
            }
        }
    }

    fn apply_event(&mut self, event: ExternalEvent) {
        match event {
            ExternalEvent::InsertCartridge(image) => {
                let inserted = Cartridge::from_image(&image)
                    .and_then(|cartridge| self.bus.memory.insert_cartridge(cartridge));
                match inserted {
                    Ok(()) => {
                        log::debug!("cartridge inserted ({} bytes)", image.len());
                        self.bus.memory.apply_pending_bank();
                    }
                    Err(err) => log::warn!("cartridge rejected: {err}"),
                }
            }
            ExternalEvent::RemoveCartridge => {
                if self.bus.memory.remove_cartridge().is_some() {
                    log::debug!("cartridge removed");
                    self.bus.memory.apply_pending_bank();
                }
            }
            ExternalEvent::InsertDisk(disk) => self.bus.chips.disk.insert_disk(disk),
            ExternalEvent::EjectDisk => {
                self.bus.chips.disk.eject_disk();
            }
            ExternalEvent::Key {
                column,
                row,
                pressed,
            } => {
                self.input.keyboard.set_key(column, row, pressed);
                self.input.apply(&mut self.bus.chips.cia1);
            }
            ExternalEvent::Joystick { port, state } => match port {
                1 | 2 => {
                    self.input.joysticks[usize::from(port - 1)] = state;
                    self.input.apply(&mut self.bus.chips.cia1);
                }
                _ => log::warn!("joystick event for missing port {port} rejected"),
            },
            ExternalEvent::Pause => self.pause(),
        }
    }
}

impl Observable for Machine {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("vic.") {
            self.bus.chips.vic.query(rest)
        } else if let Some(rest) = path.strip_prefix("sid.") {
            self.bus.chips.sid.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia1.") {
            self.bus.chips.cia1.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia2.") {
            self.bus.chips.cia2.query(rest)
        } else if let Some(rest) = path.strip_prefix("disk.") {
            self.bus.chips.disk.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let address = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix('$')) {
                u16::from_str_radix(hex, 16).ok()
            } else {
                rest.parse().ok()
            };
            address.map(|a| Value::U8(self.peek(a)))
        } else {
            match path {
                "cycle" => Some(self.clock.now().into()),
                "state" => Some(Value::String(format!("{:?}", self.state))),
                "irq" => Some(self.lines.irq.into()),
                "nmi" => Some(self.lines.nmi.into()),
                "video_bank" => Some(self.bus.chips.video_bank().into()),
                "stalled" => Some(self.stalls.iter().any(|s| s.remaining_at(self.clock.now()) > 0).into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cycle",
            "state",
            "irq",
            "nmi",
            "video_bank",
            "stalled",
            "cpu.<6502_paths>",
            "vic.<vic_paths>",
            "sid.<sid_paths>",
            "cia1.<cia_paths>",
            "cia2.<cia_paths>",
            "disk.<disk_paths>",
            "memory.<address>",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlatLayout, MemoryImage, RamRegion, TimingMode};

    /// All-RAM flat machine with the reset vector pointing at $1000.
    fn machine(program: &[u8]) -> Machine {
        let layout = FlatLayout {
            ram: vec![RamRegion {
                start: 0x0000,
                length: 0x1_0000,
            }],
            ..FlatLayout::default()
        };
        let mut config = MachineConfig::flat(TimingMode::Pal, layout);
        config.images = vec![
            MemoryImage::new(0x1000, program.to_vec()),
            MemoryImage::new(0xFFFC, vec![0x00, 0x10]),
        ];
        Machine::new(config).expect("valid config")
    }

    #[test]
    fn first_step_runs_reset_sequence() {
        let mut m = machine(&[0xEA]);
        assert_eq!(m.state(), RunState::Idle);
        let report = m.step();
        assert_eq!(report, RunReport::new(7, StopReason::CycleBudget));
        assert_eq!(m.cpu().pc(), 0x1000);
        assert_eq!(m.now(), 7);
    }

    #[test]
    fn chips_track_the_clock() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.run_cycles(1000);
        for id in ChipId::ALL {
            assert_eq!(m.chips().get(id).cycles(), m.now());
        }
    }

    #[test]
    fn pause_and_resume() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.pause();
        assert_eq!(m.run_cycles(100), RunReport::new(0, StopReason::Paused));
        m.resume();
        assert_eq!(m.state(), RunState::Running);
        assert_eq!(m.run_cycles(100).stop, StopReason::CycleBudget);
    }

    #[test]
    fn pause_event_stops_at_boundary() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.schedule(50, ExternalEvent::Pause);
        let report = m.run_cycles(1000);
        assert_eq!(report.stop, StopReason::Paused);
        assert!(report.cycles >= 50 && report.cycles < 50 + 7);
        assert_eq!(m.state(), RunState::Paused);
    }

    #[test]
    fn step_while_paused_does_nothing() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.run_cycles(20);
        m.pause();
        let before = m.now();
        assert_eq!(m.step(), RunReport::new(0, StopReason::Paused));
        assert_eq!(m.now(), before);
        assert_eq!(m.state(), RunState::Paused);
    }

    #[test]
    fn first_step_leaves_idle() {
        let mut m = machine(&[0xEA]);
        m.step();
        assert_eq!(m.state(), RunState::Running);
    }

    #[test]
    fn full_video_buffer_counts_drops() {
        let mut config = machine(&[0x4C, 0x00, 0x10]).config;
        config.video_capacity = 4;
        let mut m = Machine::new(config).expect("valid config");
        m.run_cycles(63 * 20);
        assert!(m.video_dropped() >= 16);
        assert_eq!(m.drain_video().count(), 4);
        assert_eq!(m.audio_dropped(), 0);
    }

    #[test]
    fn power_off_is_terminal() {
        let mut m = machine(&[0xEA]);
        m.power_off();
        m.resume();
        m.reset();
        assert_eq!(m.state(), RunState::Stopped);
        assert_eq!(m.step(), RunReport::new(0, StopReason::Stopped));
        assert_eq!(m.run_frame(), RunReport::new(0, StopReason::Stopped));
    }

    #[test]
    fn execute_breakpoint_stops_before_instruction_and_resumes() {
        // $1000: NOP; NOP; JMP $1000
        let mut m = machine(&[0xEA, 0xEA, 0x4C, 0x00, 0x10]);
        m.add_breakpoint(BreakpointKind::Execute, 0x1001);
        let report = m.run_cycles(1000);
        assert_eq!(report.stop, StopReason::Breakpoint(BreakpointKind::Execute, 0x1001));
        assert_eq!(m.cpu().pc(), 0x1001);

        let again = m.run_cycles(1000);
        assert_eq!(again.stop, StopReason::Breakpoint(BreakpointKind::Execute, 0x1001));
        assert_eq!(again.cycles, 2 + 3 + 2);
    }

    #[test]
    fn write_watchpoint_stops_after_step() {
        // LDA #$01; STA $0400; JMP $1005
        let mut m = machine(&[0xA9, 0x01, 0x8D, 0x00, 0x04, 0x4C, 0x05, 0x10]);
        m.add_breakpoint(BreakpointKind::Write, 0x0400);
        let report = m.run_cycles(1000);
        assert_eq!(report.stop, StopReason::Breakpoint(BreakpointKind::Write, 0x0400));
        assert_eq!(m.cpu().pc(), 0x1005);
        assert_eq!(m.peek(0x0400), 0x01);
    }

    #[test]
    fn key_event_reaches_cia1() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.schedule(
            10,
            ExternalEvent::Key {
                column: 2,
                row: 5,
                pressed: true,
            },
        );
        m.run_cycles(20);
        assert!(m.input().keyboard.is_pressed(2, 5));
    }

    #[test]
    fn bad_cartridge_event_is_rejected() {
        let mut m = machine(&[0x4C, 0x00, 0x10]);
        m.schedule(0, ExternalEvent::InsertCartridge(vec![0; 0x2000]));
        m.run_cycles(20);
        // The flat layout has no cartridge port.
        assert!(m.memory().cartridge().is_none());
    }

    #[test]
    fn observable_paths() {
        let mut m = machine(&[0xEA]);
        m.step();
        assert_eq!(m.query("cpu.pc"), Some(Value::U16(0x1000)));
        assert_eq!(m.query("memory.$1000"), Some(Value::U8(0xEA)));
        assert_eq!(m.query("memory.0xFFFD"), Some(Value::U8(0x10)));
        assert_eq!(m.query("cycle"), Some(Value::U64(7)));
        assert_eq!(m.query("disk.half_track"), Some(Value::U8(34)));
        assert_eq!(m.query("nope"), None);
    }
}
