//! Core traits and types for cycle-accurate emulation.
//!
//! Everything is measured in CPU cycles on a single shared clock. The
//! scheduler owns the clock; CPUs and chips only ever learn how many
//! cycles elapsed.

mod bus;
mod chip;
mod clock;
mod cpu;
mod event;
mod interrupt;
mod observable;
mod state;
mod write_queue;

pub use bus::{Bus, SimpleBus};
pub use chip::{BusStall, Chip, DmaView, NoDma};
pub use clock::{Clock, MasterClock};
pub use cpu::Cpu;
pub use event::EventStream;
pub use interrupt::{InterruptClass, InterruptLines};
pub use observable::{Observable, Value};
pub use state::{SaveState, StateError, StateReader, StateWriter};
pub use write_queue::{RegisterWrite, WriteQueue};
