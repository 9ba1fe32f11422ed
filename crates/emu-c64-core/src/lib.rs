//! Cycle-accurate Commodore 64 machine core.
//!
//! One shared clock counts CPU cycles (985,248 Hz PAL, 1,022,727 Hz NTSC).
//! The scheduler runs the 6502 one step at a time, then ticks the VIC-II,
//! SID, both CIAs and the disk controller for exactly the cycles that step
//! consumed. Register accesses carry the cycle they happened on, so a chip
//! sees CPU writes at the right point in its own timeline.
//!
//! Video and audio leave the core as timestamped event streams; the host
//! drains them. The whole machine state can be captured and restored with
//! [`Machine::save_snapshot`] and [`Machine::load_snapshot`].

mod bus;
mod chips;
mod config;
mod error;
mod keyboard;
mod machine;
mod memory;
mod snapshot;

pub use bus::{BreakpointKind, Breakpoints, C64Bus};
pub use chips::{ChipId, Chips};
pub use config::{
    ChipWindow, FlatLayout, MachineConfig, MemoryImage, MemoryLayout, NTSC, PAL, RamRegion,
    RomSet, TimingMode, TimingParams,
};
pub use error::{BusError, ConfigError, SnapshotError};
pub use keyboard::{Input, JoystickState, KeyboardMatrix};
pub use machine::{ExternalEvent, Machine, RunReport, RunState, StopReason};
pub use memory::{Cartridge, Mapping, MappingKind, Memory, Owner, VideoView};
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

pub use drive_gcr_controller::Disk;
pub use mos_sid_6581::{SampleDelta, SidModel};
pub use mos_vic_ii::{VideoEvent, VideoStandard};
