//! CPU core trait.

use crate::{Bus, InterruptLines};

/// A CPU core driven one instruction at a time.
///
/// The bus is passed in, not owned, so the machine can keep it shared with
/// the chips whose register windows it routes to.
pub trait Cpu<B: Bus> {
    /// Execute one instruction, or one interrupt or reset sequence.
    ///
    /// Returns the exact number of cycles consumed. Never fails: garbage
    /// in memory produces wrong-but-deterministic state, like silicon.
    fn step(&mut self, bus: &mut B) -> u32;

    /// Request a reset. The reset sequence runs on the next `step`.
    fn reset(&mut self);

    /// Present the resolved interrupt levels for the next `step`.
    fn set_interrupt_lines(&mut self, lines: InterruptLines);

    /// Current program counter.
    fn pc(&self) -> u16;

    /// True when the CPU has locked up and only a reset recovers it.
    fn is_halted(&self) -> bool;
}
