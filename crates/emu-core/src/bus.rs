//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The CPU performs exactly one bus access per cycle, so an
/// implementation can timestamp every access by counting calls since the
/// start of the step.
pub trait Bus {
    /// Read a byte, with whatever side effects the target has.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte without side effects (debuggers, tests).
    fn peek(&self, address: u16) -> u8;
}

/// Flat 64 KiB RAM bus for CPU tests.
///
/// Counts every access so tests can check that an instruction touched
/// the bus exactly once per cycle.
pub struct SimpleBus {
    memory: Box<[u8; 0x10000]>,
    accesses: u32,
    writes: Vec<(u16, u8)>,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            accesses: 0,
            writes: Vec::new(),
        }
    }

    /// Copy `data` into memory at `address`, wrapping at the top.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory[usize::from(address.wrapping_add(i as u16))] = byte;
        }
    }

    /// Bus accesses since the last `reset_accesses`.
    #[must_use]
    pub fn accesses(&self) -> u32 {
        self.accesses
    }

    pub fn reset_accesses(&mut self) {
        self.accesses = 0;
        self.writes.clear();
    }

    /// Writes since the last `reset_accesses`, in order.
    #[must_use]
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.accesses += 1;
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.accesses += 1;
        self.writes.push((address, value));
        self.memory[usize::from(address)] = value;
    }

    fn peek(&self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }
}
