//! Machine configuration: timing mode, memory layout and ROM images.

use emu_core::MasterClock;
use mos_sid_6581::SidModel;
use mos_vic_ii::VideoStandard;

use crate::chips::ChipId;
use crate::error::ConfigError;

/// Crystal-derived timing of one machine variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    /// CPU clock in Hz.
    pub cpu_hz: u32,
    pub standard: VideoStandard,
    /// Mains frequency feeding the TOD clocks.
    pub mains_hz: u32,
}

/// PAL C64 (6569 VIC-II, 985,248 Hz CPU).
pub const PAL: TimingParams = TimingParams {
    cpu_hz: 985_248,
    standard: VideoStandard::Pal,
    mains_hz: 50,
};

/// NTSC C64 (6567 VIC-II, 1,022,727 Hz CPU).
pub const NTSC: TimingParams = TimingParams {
    cpu_hz: 1_022_727,
    standard: VideoStandard::Ntsc,
    mains_hz: 60,
};

impl TimingParams {
    #[must_use]
    pub const fn master_clock(&self) -> MasterClock {
        MasterClock::new(self.cpu_hz)
    }
}

/// Timing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimingMode {
    #[default]
    Pal,
    Ntsc,
}

impl TimingMode {
    #[must_use]
    pub const fn params(self) -> TimingParams {
        match self {
            Self::Pal => PAL,
            Self::Ntsc => NTSC,
        }
    }

    /// CPU cycles in one video frame.
    #[must_use]
    pub fn cycles_per_frame(self) -> u64 {
        u64::from(self.params().standard.cycles_per_frame())
    }
}

/// Bytes placed at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryImage {
    pub start: u16,
    pub bytes: Vec<u8>,
}

impl MemoryImage {
    #[must_use]
    pub fn new(start: u16, bytes: Vec<u8>) -> Self {
        Self { start, bytes }
    }

    fn check_fits(&self) -> Result<(), ConfigError> {
        check_region(self.start, self.bytes.len() as u32)
    }
}

/// The three system ROMs of the C64 layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RomSet {
    /// Kernal ROM (8,192 bytes).
    pub kernal: Vec<u8>,
    /// BASIC ROM (8,192 bytes).
    pub basic: Vec<u8>,
    /// Character ROM (4,096 bytes).
    pub chargen: Vec<u8>,
}

impl RomSet {
    fn validate(&self) -> Result<(), ConfigError> {
        for (rom, bytes, expected) in [
            ("kernal", &self.kernal, 0x2000),
            ("BASIC", &self.basic, 0x2000),
            ("character", &self.chargen, 0x1000),
        ] {
            if bytes.len() != expected {
                return Err(ConfigError::RomSize {
                    rom,
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        Ok(())
    }
}

/// A RAM range of the flat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RamRegion {
    pub start: u16,
    pub length: u32,
}

/// A chip register window of the flat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipWindow {
    pub chip: ChipId,
    pub start: u16,
    pub length: u32,
}

/// Explicit memory map with no banking logic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlatLayout {
    pub ram: Vec<RamRegion>,
    /// Read-only images; writes to them are ignored.
    pub roms: Vec<MemoryImage>,
    pub windows: Vec<ChipWindow>,
    /// Start of the 1 KiB colour RAM window, if mapped.
    pub colour_ram: Option<u16>,
}

/// How the 64 KiB address space is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryLayout {
    /// Standard C64 map with processor-port banking.
    C64(RomSet),
    Flat(FlatLayout),
}

impl MemoryLayout {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::C64(_) => "C64",
            Self::Flat(_) => "flat",
        }
    }
}

/// Configuration for constructing a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MachineConfig {
    pub timing: TimingMode,
    pub sid_model: SidModel,
    pub layout: MemoryLayout,
    /// Copied into RAM at power-on and on every reset.
    pub images: Vec<MemoryImage>,
    /// Order chips are ticked in; a permutation of [`ChipId::ALL`].
    pub chip_order: Vec<ChipId>,
    /// Value read from unmapped addresses.
    pub open_bus: u8,
    /// Record unmapped accesses as bus faults.
    pub validate_bus: bool,
    /// Audio output rate in Hz.
    pub sample_rate: u32,
    /// Video events buffered before the oldest are dropped.
    pub video_capacity: usize,
    /// Audio events buffered before the oldest are dropped.
    pub audio_capacity: usize,
    /// CPU cycles per TOD tenth of a second.
    pub tod_tick_cycles: u32,
}

impl MachineConfig {
    /// Standard C64 with the given ROMs.
    #[must_use]
    pub fn c64(timing: TimingMode, roms: RomSet) -> Self {
        Self::with_layout(timing, MemoryLayout::C64(roms))
    }

    /// Flat layout, for tests and non-C64 maps.
    #[must_use]
    pub fn flat(timing: TimingMode, layout: FlatLayout) -> Self {
        Self::with_layout(timing, MemoryLayout::Flat(layout))
    }

    fn with_layout(timing: TimingMode, layout: MemoryLayout) -> Self {
        let params = timing.params();
        let frame = params.standard.cycles_per_frame() as usize;
        Self {
            timing,
            sid_model: SidModel::default(),
            layout,
            images: Vec::new(),
            chip_order: ChipId::ALL.to_vec(),
            open_bus: 0xFF,
            validate_bus: false,
            sample_rate: 44_100,
            // About two frames of pixel and sync events.
            video_capacity: frame * 2,
            audio_capacity: 16_384,
            // TOD counts tenths of a second.
            tod_tick_cycles: params.master_clock().cycles_per(10),
        }
    }

    /// Check everything `Machine::new` relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut order = self.chip_order.clone();
        order.sort();
        if order != ChipId::ALL {
            return Err(ConfigError::ChipOrder(self.chip_order.clone()));
        }

        let cpu_hz = self.timing.params().cpu_hz;
        if self.sample_rate == 0 || self.sample_rate >= cpu_hz {
            return Err(ConfigError::Timing(
                "sample rate must be non-zero and below the CPU clock",
            ));
        }
        if self.tod_tick_cycles == 0 {
            return Err(ConfigError::Timing("TOD tick period must be non-zero"));
        }

        for image in &self.images {
            image.check_fits()?;
        }
        match &self.layout {
            MemoryLayout::C64(roms) => roms.validate(),
            MemoryLayout::Flat(flat) => {
                for rom in &flat.roms {
                    rom.check_fits()?;
                }
                Ok(())
            }
        }
    }
}

/// A non-empty range inside the 64 KiB space.
pub(crate) fn check_region(start: u16, length: u32) -> Result<(), ConfigError> {
    if length == 0 || u32::from(start) + length > 0x1_0000 {
        Err(ConfigError::RegionOutOfRange { start, length })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roms() -> RomSet {
        RomSet {
            kernal: vec![0xEE; 0x2000],
            basic: vec![0xBB; 0x2000],
            chargen: vec![0xCC; 0x1000],
        }
    }

    #[test]
    fn presets_match_crystals() {
        assert_eq!(TimingMode::Pal.cycles_per_frame(), 19_656);
        assert_eq!(TimingMode::Ntsc.cycles_per_frame(), 17_095);
        let config = MachineConfig::c64(TimingMode::Pal, roms());
        assert_eq!(config.tod_tick_cycles, 98_524);
        assert_eq!(PAL.master_clock().cycles_per(PAL.mains_hz), 19_704);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn wrong_rom_size_rejected() {
        let mut set = roms();
        set.chargen.pop();
        let config = MachineConfig::c64(TimingMode::Pal, set);
        assert_eq!(
            config.validate(),
            Err(ConfigError::RomSize {
                rom: "character",
                expected: 0x1000,
                actual: 0x0FFF,
            })
        );
    }

    #[test]
    fn chip_order_must_be_permutation() {
        let mut config = MachineConfig::c64(TimingMode::Pal, roms());
        config.chip_order = vec![ChipId::Vic, ChipId::Vic, ChipId::Sid, ChipId::Cia1, ChipId::Disk];
        assert!(matches!(config.validate(), Err(ConfigError::ChipOrder(_))));

        config.chip_order = vec![ChipId::Disk, ChipId::Cia2, ChipId::Cia1, ChipId::Sid, ChipId::Vic];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn image_past_top_of_memory_rejected() {
        let mut config = MachineConfig::flat(TimingMode::Ntsc, FlatLayout::default());
        config.images.push(MemoryImage::new(0xFFFA, vec![0; 8]));
        assert_eq!(
            config.validate(),
            Err(ConfigError::RegionOutOfRange {
                start: 0xFFFA,
                length: 8,
            })
        );
    }

    #[test]
    fn sample_rate_bounds() {
        let mut config = MachineConfig::c64(TimingMode::Pal, roms());
        config.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Timing(_))));
        config.sample_rate = 2_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Timing(_))));
    }
}
