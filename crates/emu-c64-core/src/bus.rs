//! The CPU's view of the machine.
//!
//! Implements `emu_core::Bus` over the mapping table. Every access is
//! stamped with its cycle: the n-th access of a step happens at the step's
//! base cycle plus n, because the CPU touches the bus exactly once per
//! cycle. Chip windows forward to the owning chip with that stamp.

use std::collections::BTreeSet;

use emu_core::Bus;

use crate::chips::Chips;
use crate::error::BusError;
use crate::memory::{Memory, Owner};

/// What a breakpoint watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    Execute,
    Read,
    Write,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoints {
    execute: BTreeSet<u16>,
    read: BTreeSet<u16>,
    write: BTreeSet<u16>,
}

impl Breakpoints {
    fn set(&mut self, kind: BreakpointKind) -> &mut BTreeSet<u16> {
        match kind {
            BreakpointKind::Execute => &mut self.execute,
            BreakpointKind::Read => &mut self.read,
            BreakpointKind::Write => &mut self.write,
        }
    }

    pub fn add(&mut self, kind: BreakpointKind, address: u16) {
        self.set(kind).insert(address);
    }

    pub fn remove(&mut self, kind: BreakpointKind, address: u16) -> bool {
        self.set(kind).remove(&address)
    }

    pub fn clear(&mut self) {
        self.execute.clear();
        self.read.clear();
        self.write.clear();
    }

    #[must_use]
    pub fn is_execute(&self, address: u16) -> bool {
        self.execute.contains(&address)
    }
}

/// Memory plus chips, as the CPU sees them.
#[derive(Debug, Clone)]
pub struct C64Bus {
    pub memory: Memory,
    pub chips: Chips,
    step_base: u64,
    accesses: u32,
    validate: bool,
    pub(crate) breakpoints: Breakpoints,
    hit: Option<(BreakpointKind, u16)>,
    faults: Vec<BusError>,
}

impl C64Bus {
    #[must_use]
    pub fn new(memory: Memory, chips: Chips, validate: bool) -> Self {
        Self {
            memory,
            chips,
            step_base: 0,
            accesses: 0,
            validate,
            breakpoints: Breakpoints::default(),
            hit: None,
            faults: Vec::new(),
        }
    }

    /// Start a CPU step at cycle `now`.
    pub fn begin_step(&mut self, now: u64) {
        self.step_base = now;
        self.accesses = 0;
    }

    /// Bus accesses made by the current step.
    #[must_use]
    pub fn accesses(&self) -> u32 {
        self.accesses
    }

    fn next_cycle(&mut self) -> u64 {
        let at = self.step_base + u64::from(self.accesses);
        self.accesses += 1;
        at
    }

    fn watch(&mut self, kind: BreakpointKind, address: u16) {
        if self.hit.is_none() && self.breakpoints.set(kind).contains(&address) {
            self.hit = Some((kind, address));
        }
    }

    fn unmapped(&mut self, address: u16, cycle: u64, write: bool) {
        if self.validate {
            let fault = BusError::UnmappedAddress {
                address,
                cycle,
                write,
            };
            log::warn!("{fault}");
            self.faults.push(fault);
        }
    }

    /// First read or write watchpoint hit since the last call.
    pub fn take_hit(&mut self) -> Option<(BreakpointKind, u16)> {
        self.hit.take()
    }

    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    pub fn take_faults(&mut self) -> Vec<BusError> {
        std::mem::take(&mut self.faults)
    }
}

impl Bus for C64Bus {
    fn read(&mut self, address: u16) -> u8 {
        let at = self.next_cycle();
        self.watch(BreakpointKind::Read, address);

        if address < 2 && self.memory.has_port() {
            return self.memory.read_port(address);
        }
        match self.memory.resolve(address) {
            Some(mapping) => match mapping.owner {
                Owner::Chip(id) => self
                    .chips
                    .get_mut(id)
                    .read_register(mapping.offset(address), at),
                _ => self.memory.read_store(&mapping, address),
            },
            None => {
                self.unmapped(address, at, false);
                self.memory.open_bus()
            }
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        let at = self.next_cycle();
        self.watch(BreakpointKind::Write, address);

        if address < 2 && self.memory.has_port() {
            self.memory.write_port(address, value);
            // The RAM cell underneath still latches the value.
            self.memory.ram_write(address, value);
            return;
        }
        match self.memory.resolve(address) {
            Some(mapping) => match mapping.owner {
                Owner::Chip(id) => {
                    self.chips
                        .get_mut(id)
                        .write_register(mapping.offset(address), value, at);
                }
                _ => self.memory.write_store(&mapping, address, value),
            },
            None => self.unmapped(address, at, true),
        }
    }

    fn peek(&self, address: u16) -> u8 {
        if address < 2 && self.memory.has_port() {
            return self.memory.read_port(address);
        }
        match self.memory.resolve(address) {
            Some(mapping) => match mapping.owner {
                Owner::Chip(id) => self.chips.get(id).peek_register(mapping.offset(address)),
                _ => self.memory.read_store(&mapping, address),
            },
            None => self.memory.open_bus(),
        }
    }
}
