//! Error types at the machine boundary.

use emu_core::StateError;
use thiserror::Error;

use crate::chips::ChipId;

/// The machine cannot be built (or a cartridge cannot be inserted) with
/// the given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{rom} ROM is {actual} bytes, expected {expected}")]
    RomSize {
        rom: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("region ${start:04X}+{length} does not fit the 64 KiB address space")]
    RegionOutOfRange { start: u16, length: u32 },
    #[error("mappings at ${first:04X} and ${second:04X} overlap")]
    Overlap { first: u16, second: u16 },
    #[error("no backing store large enough for the mapping at ${start:04X}")]
    MissingBacking { start: u16 },
    #[error("mapping at ${start:04X} straddles the edge of the replaced range")]
    PartialReplace { start: u16 },
    #[error("chip order must name every chip exactly once, got {0:?}")]
    ChipOrder(Vec<ChipId>),
    #[error("invalid timing parameter: {0}")]
    Timing(&'static str),
    #[error("cartridge image of {0} bytes is neither 8K nor 16K")]
    CartridgeSize(usize),
    #[error("the flat memory layout has no cartridge port")]
    NoCartridgePort,
}

/// A snapshot could not be restored. The live machine is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a machine snapshot")]
    BadMagic,
    #[error("snapshot format version {found}, expected {expected}")]
    FormatVersion { found: u32, expected: u32 },
    /// `component` is 0 when the container framing itself is short.
    #[error("snapshot truncated in component {component}")]
    TruncatedData { component: u32 },
    #[error("unknown snapshot component {0}")]
    UnknownComponent(u32),
    #[error("snapshot component {0} missing")]
    MissingComponent(u32),
    #[error("snapshot component {0} appears twice")]
    DuplicateComponent(u32),
    #[error("snapshot component {component} is corrupt: {source}")]
    Corrupt {
        component: u32,
        #[source]
        source: StateError,
    },
}

/// Bus access outside every mapping, recorded when bus validation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unmapped {} of ${address:04X} at cycle {cycle}", access_kind(.write))]
    UnmappedAddress { address: u16, cycle: u64, write: bool },
}

fn access_kind(write: &bool) -> &'static str {
    if *write { "write" } else { "read" }
}
