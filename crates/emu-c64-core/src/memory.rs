//! Backing stores, the mapping table and C64 banking.
//!
//! The address space is an ordered list of non-overlapping mappings from
//! address ranges to backing stores. A 256-entry page table resolves most
//! addresses directly; pages shared by several mappings fall back to a
//! binary search.
//!
//! # C64 banking
//!
//! The 6510 port at $00 (DDR) and $01 (data) plus the cartridge GAME and
//! EXROM lines select what appears at $8000-$FFFF:
//!
//! | HIRAM | LORAM | CHAREN | $A000-$BFFF | $D000-$DFFF | $E000-$FFFF |
//! |-------|-------|--------|-------------|-------------|-------------|
//! | 1     | 1     | 1      | BASIC       | I/O         | Kernal      |
//! | 1     | 1     | 0      | BASIC       | Char ROM    | Kernal      |
//! | 1     | 0     | 1      | RAM         | I/O         | Kernal      |
//! | 1     | 0     | 0      | RAM         | Char ROM    | Kernal      |
//! | 0     | 1     | 1      | RAM         | I/O         | RAM         |
//! | 0     | 1     | 0      | RAM         | Char ROM    | RAM         |
//! | 0     | 0     | x      | RAM         | RAM         | RAM         |
//!
//! Port writes only mark the map stale; the new map is swapped in at the
//! end of the step, never mid-instruction. ROM writes fall through to the
//! RAM underneath.

use emu_core::{DmaView, StateError, StateReader, StateWriter};

use crate::chips::ChipId;
use crate::config::{MachineConfig, MemoryImage, MemoryLayout, check_region};
use crate::error::ConfigError;

/// ROM slots of the C64 layout.
pub const SLOT_KERNAL: u8 = 0;
pub const SLOT_BASIC: u8 = 1;
pub const SLOT_CHARGEN: u8 = 2;
pub const SLOT_ROML: u8 = 3;
pub const SLOT_ROMH: u8 = 4;

const COLOUR_RAM_SIZE: usize = 0x400;

/// Port pins with nothing driving them read high.
const PORT_PULLUPS: u8 = 0x37;
const PORT_DDR_POWER_ON: u8 = 0x2F;
const PORT_DATA_POWER_ON: u8 = 0x37;

/// Backing store behind a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// 64 KiB main RAM, addressed by absolute address.
    MainRam,
    /// 1 KiB of 4-bit colour RAM.
    ColourRam,
    Rom(u8),
    Chip(ChipId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Ram,
    Rom,
    IoWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub start: u16,
    pub length: u32,
    pub owner: Owner,
    /// Writes to a ROM mapping land in main RAM at the same address.
    pub ram_under_rom: bool,
}

impl Mapping {
    #[must_use]
    pub const fn ram(start: u16, length: u32) -> Self {
        Self {
            start,
            length,
            owner: Owner::MainRam,
            ram_under_rom: false,
        }
    }

    #[must_use]
    pub const fn rom(start: u16, length: u32, slot: u8, ram_under_rom: bool) -> Self {
        Self {
            start,
            length,
            owner: Owner::Rom(slot),
            ram_under_rom,
        }
    }

    #[must_use]
    pub const fn chip(start: u16, length: u32, chip: ChipId) -> Self {
        Self {
            start,
            length,
            owner: Owner::Chip(chip),
            ram_under_rom: false,
        }
    }

    #[must_use]
    pub const fn colour_ram(start: u16) -> Self {
        Self {
            start,
            length: COLOUR_RAM_SIZE as u32,
            owner: Owner::ColourRam,
            ram_under_rom: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> MappingKind {
        match self.owner {
            Owner::MainRam | Owner::ColourRam => MappingKind::Ram,
            Owner::Rom(_) => MappingKind::Rom,
            Owner::Chip(_) => MappingKind::IoWindow,
        }
    }

    /// One past the last address.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start as u32 + self.length
    }

    #[must_use]
    pub const fn contains(&self, address: u16) -> bool {
        address >= self.start && (address as u32) < self.end()
    }

    /// Offset of `address` into the backing store.
    #[must_use]
    pub const fn offset(&self, address: u16) -> u16 {
        address - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Unmapped,
    Single(u16),
    Shared,
}

/// Cartridge ROM with its GAME/EXROM wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cartridge {
    low: Vec<u8>,
    high: Option<Vec<u8>>,
}

impl Cartridge {
    /// 8K images map at $8000, 16K images at $8000 and $A000.
    pub fn from_image(image: &[u8]) -> Result<Self, ConfigError> {
        match image.len() {
            0x2000 => Ok(Self {
                low: image.to_vec(),
                high: None,
            }),
            0x4000 => Ok(Self {
                low: image[..0x2000].to_vec(),
                high: Some(image[0x2000..].to_vec()),
            }),
            len => Err(ConfigError::CartridgeSize(len)),
        }
    }

    /// GAME line level (low = asserted).
    #[must_use]
    pub fn game(&self) -> bool {
        self.high.is_none()
    }

    /// EXROM line level (low = asserted).
    #[must_use]
    pub fn exrom(&self) -> bool {
        false
    }
}

/// All backing stores and the address map.
#[derive(Debug, Clone)]
pub struct Memory {
    ram: Box<[u8; 0x1_0000]>,
    colour: Box<[u8; COLOUR_RAM_SIZE]>,
    roms: Vec<Vec<u8>>,
    cartridge: Option<Cartridge>,
    mappings: Vec<Mapping>,
    pages: Box<[Page; 256]>,
    open_bus: u8,
    /// C64 layout: processor port and banking present.
    banking: bool,
    port_ddr: u8,
    port_data: u8,
    /// Bank configuration the installed map was built for.
    applied_bank: u8,
    images: Vec<MemoryImage>,
}

impl Memory {
    pub fn new(config: &MachineConfig) -> Result<Self, ConfigError> {
        let mut memory = Self {
            ram: Box::new([0; 0x1_0000]),
            colour: Box::new([0; COLOUR_RAM_SIZE]),
            roms: Vec::new(),
            cartridge: None,
            mappings: Vec::new(),
            pages: Box::new([Page::Unmapped; 256]),
            open_bus: config.open_bus,
            banking: false,
            port_ddr: PORT_DDR_POWER_ON,
            port_data: PORT_DATA_POWER_ON,
            applied_bank: 0,
            images: config.images.clone(),
        };

        let mappings = match &config.layout {
            MemoryLayout::C64(roms) => {
                memory.banking = true;
                memory.roms = vec![
                    roms.kernal.clone(),
                    roms.basic.clone(),
                    roms.chargen.clone(),
                    Vec::new(),
                    Vec::new(),
                ];
                memory.applied_bank = memory.bank_config();
                let mut map = vec![Mapping::ram(0x0000, 0x8000)];
                map.extend(memory.bank_mappings(memory.applied_bank));
                map
            }
            MemoryLayout::Flat(flat) => {
                memory.roms = flat.roms.iter().map(|rom| rom.bytes.clone()).collect();
                let mut map: Vec<Mapping> = flat
                    .ram
                    .iter()
                    .map(|region| Mapping::ram(region.start, region.length))
                    .collect();
                for (slot, rom) in flat.roms.iter().enumerate() {
                    map.push(Mapping::rom(rom.start, rom.bytes.len() as u32, slot as u8, false));
                }
                for window in &flat.windows {
                    map.push(Mapping::chip(window.start, window.length, window.chip));
                }
                if let Some(start) = flat.colour_ram {
                    map.push(Mapping::colour_ram(start));
                }
                map
            }
        };

        memory.install_all(mappings)?;
        memory.load_images();
        Ok(memory)
    }

    // =========================================================================
    // Mapping table
    // =========================================================================

    #[must_use]
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Mapping that covers `address`.
    #[must_use]
    pub fn resolve(&self, address: u16) -> Option<Mapping> {
        match self.pages[usize::from(address >> 8)] {
            Page::Unmapped => None,
            Page::Single(index) => Some(self.mappings[usize::from(index)]),
            Page::Shared => {
                let index = self.mappings.partition_point(|m| m.start <= address);
                let mapping = self.mappings[index.checked_sub(1)?];
                mapping.contains(address).then_some(mapping)
            }
        }
    }

    /// Add one mapping. Only between steps.
    pub fn install_mapping(&mut self, mapping: Mapping) -> Result<(), ConfigError> {
        let mut map = self.mappings.clone();
        map.push(mapping);
        self.install_all(map)?;
        log::debug!(
            "mapped ${:04X}+{} to {:?}",
            mapping.start,
            mapping.length,
            mapping.owner
        );
        Ok(())
    }

    /// Remove the mapping that exactly covers `[start, start + length)`.
    /// Returns whether one was found.
    pub fn remove_mapping(&mut self, start: u16, length: u32) -> bool {
        let before = self.mappings.len();
        self.mappings
            .retain(|m| !(m.start == start && m.length == length));
        let removed = self.mappings.len() != before;
        if removed {
            self.rebuild_pages();
            log::debug!("unmapped ${start:04X}+{length}");
        }
        removed
    }

    /// Atomically swap everything inside `[start, start + length)` for
    /// `mappings`. The complete new map is validated first; on error
    /// nothing changes.
    pub fn replace_range(
        &mut self,
        start: u16,
        length: u32,
        mappings: Vec<Mapping>,
    ) -> Result<(), ConfigError> {
        check_region(start, length)?;
        let end = u32::from(start) + length;
        let mut map = Vec::with_capacity(self.mappings.len() + mappings.len());
        for mapping in &self.mappings {
            let inside = mapping.start >= start && mapping.end() <= end;
            let outside = mapping.end() <= u32::from(start) || u32::from(mapping.start) >= end;
            if inside {
                continue;
            }
            if !outside {
                return Err(ConfigError::PartialReplace {
                    start: mapping.start,
                });
            }
            map.push(*mapping);
        }
        for mapping in &mappings {
            if mapping.start < start || mapping.end() > end {
                return Err(ConfigError::RegionOutOfRange {
                    start: mapping.start,
                    length: mapping.length,
                });
            }
        }
        map.extend(mappings);
        self.install_all(map)
    }

    fn install_all(&mut self, mut map: Vec<Mapping>) -> Result<(), ConfigError> {
        map.sort_by_key(|m| m.start);
        self.validate_map(&map)?;
        self.mappings = map;
        self.rebuild_pages();
        Ok(())
    }

    fn validate_map(&self, map: &[Mapping]) -> Result<(), ConfigError> {
        for mapping in map {
            check_region(mapping.start, mapping.length)?;
            let backed = match mapping.owner {
                Owner::MainRam | Owner::Chip(_) => true,
                Owner::ColourRam => mapping.length as usize <= COLOUR_RAM_SIZE,
                Owner::Rom(slot) => self
                    .roms
                    .get(usize::from(slot))
                    .is_some_and(|rom| rom.len() >= mapping.length as usize),
            };
            if !backed {
                return Err(ConfigError::MissingBacking {
                    start: mapping.start,
                });
            }
        }
        for pair in map.windows(2) {
            if pair[0].end() > u32::from(pair[1].start) {
                return Err(ConfigError::Overlap {
                    first: pair[0].start,
                    second: pair[1].start,
                });
            }
        }
        Ok(())
    }

    fn rebuild_pages(&mut self) {
        self.pages.fill(Page::Unmapped);
        for (index, mapping) in self.mappings.iter().enumerate() {
            let first = usize::from(mapping.start >> 8);
            let last = ((mapping.end() - 1) >> 8) as usize;
            for page in first..=last {
                let page_start = (page as u32) << 8;
                let whole =
                    u32::from(mapping.start) <= page_start && mapping.end() >= page_start + 0x100;
                self.pages[page] = match self.pages[page] {
                    Page::Unmapped if whole => Page::Single(index as u16),
                    _ => Page::Shared,
                };
            }
        }
    }

    // =========================================================================
    // Data access
    // =========================================================================

    #[must_use]
    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram[..]
    }

    /// Direct RAM write, bypassing the map.
    pub fn ram_write(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }

    #[must_use]
    pub fn colour_ram(&self) -> &[u8] {
        &self.colour[..]
    }

    /// Read through a non-chip mapping.
    #[must_use]
    pub(crate) fn read_store(&self, mapping: &Mapping, address: u16) -> u8 {
        let offset = usize::from(mapping.offset(address));
        match mapping.owner {
            Owner::MainRam => self.ram[usize::from(address)],
            Owner::ColourRam => self.colour[offset] & 0x0F,
            Owner::Rom(slot) => self
                .roms
                .get(usize::from(slot))
                .and_then(|rom| rom.get(offset))
                .copied()
                .unwrap_or(self.open_bus),
            Owner::Chip(_) => self.open_bus,
        }
    }

    /// Write through a non-chip mapping.
    pub(crate) fn write_store(&mut self, mapping: &Mapping, address: u16, value: u8) {
        match mapping.owner {
            Owner::MainRam => self.ram[usize::from(address)] = value,
            Owner::ColourRam => {
                self.colour[usize::from(mapping.offset(address))] = value & 0x0F;
            }
            Owner::Rom(_) if mapping.ram_under_rom => self.ram[usize::from(address)] = value,
            Owner::Rom(_) | Owner::Chip(_) => {}
        }
    }

    fn load_images(&mut self) {
        for image in &self.images {
            let start = usize::from(image.start);
            self.ram[start..start + image.bytes.len()].copy_from_slice(&image.bytes);
        }
    }

    // =========================================================================
    // Processor port and banking
    // =========================================================================

    /// True when the processor port answers at $00/$01.
    #[must_use]
    pub fn has_port(&self) -> bool {
        self.banking
    }

    #[must_use]
    pub fn read_port(&self, address: u16) -> u8 {
        if address == 0 {
            self.port_ddr
        } else {
            self.port_pins()
        }
    }

    /// Port write. A banking change waits for [`Self::apply_pending_bank`].
    pub fn write_port(&mut self, address: u16, value: u8) {
        if address == 0 {
            self.port_ddr = value;
        } else {
            self.port_data = value;
        }
    }

    fn port_pins(&self) -> u8 {
        (self.port_data & self.port_ddr) | (PORT_PULLUPS & !self.port_ddr)
    }

    /// Bit 0 LORAM, 1 HIRAM, 2 CHAREN, 3 GAME, 4 EXROM.
    fn bank_config(&self) -> u8 {
        let (game, exrom) = self
            .cartridge
            .as_ref()
            .map_or((true, true), |c| (c.game(), c.exrom()));
        (self.port_pins() & 0x07) | (u8::from(game) << 3) | (u8::from(exrom) << 4)
    }

    /// True when the installed map no longer matches the port and
    /// cartridge lines.
    #[must_use]
    pub fn bank_pending(&self) -> bool {
        self.banking && self.bank_config() != self.applied_bank
    }

    /// Install the map for the current banking lines, if it changed.
    pub fn apply_pending_bank(&mut self) {
        if !self.bank_pending() {
            return;
        }
        let config = self.bank_config();
        match self.replace_range(0x8000, 0x8000, self.bank_mappings(config)) {
            Ok(()) => {
                log::debug!("bank switch {:02X} -> {config:02X}", self.applied_bank);
                self.applied_bank = config;
            }
            Err(err) => log::warn!("bank switch to {config:02X} rejected: {err}"),
        }
    }

    fn bank_mappings(&self, config: u8) -> Vec<Mapping> {
        let loram = config & 0x01 != 0;
        let hiram = config & 0x02 != 0;
        let charen = config & 0x04 != 0;
        let game = config & 0x08 != 0;
        let exrom = config & 0x10 != 0;

        let mut map = Vec::with_capacity(10);
        map.push(if !exrom && loram && hiram {
            Mapping::rom(0x8000, 0x2000, SLOT_ROML, true)
        } else {
            Mapping::ram(0x8000, 0x2000)
        });
        map.push(if !exrom && !game && hiram {
            Mapping::rom(0xA000, 0x2000, SLOT_ROMH, true)
        } else if loram && hiram {
            Mapping::rom(0xA000, 0x2000, SLOT_BASIC, true)
        } else {
            Mapping::ram(0xA000, 0x2000)
        });
        map.push(Mapping::ram(0xC000, 0x1000));

        if charen && (hiram || loram) {
            map.extend([
                Mapping::chip(0xD000, 0x400, ChipId::Vic),
                Mapping::chip(0xD400, 0x400, ChipId::Sid),
                Mapping::colour_ram(0xD800),
                Mapping::chip(0xDC00, 0x100, ChipId::Cia1),
                Mapping::chip(0xDD00, 0x100, ChipId::Cia2),
                Mapping::chip(0xDE00, 0x100, ChipId::Disk),
            ]);
        } else if hiram || loram {
            map.push(Mapping::rom(0xD000, 0x1000, SLOT_CHARGEN, true));
        } else {
            map.push(Mapping::ram(0xD000, 0x1000));
        }

        map.push(if hiram {
            Mapping::rom(0xE000, 0x2000, SLOT_KERNAL, true)
        } else {
            Mapping::ram(0xE000, 0x2000)
        });
        map
    }

    #[must_use]
    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// Plug in a cartridge; the map follows at the next bank switch point.
    pub fn insert_cartridge(&mut self, cartridge: Cartridge) -> Result<(), ConfigError> {
        if !self.banking {
            return Err(ConfigError::NoCartridgePort);
        }
        self.roms[usize::from(SLOT_ROML)].clone_from(&cartridge.low);
        self.roms[usize::from(SLOT_ROMH)] = cartridge.high.clone().unwrap_or_default();
        self.cartridge = Some(cartridge);
        Ok(())
    }

    pub fn remove_cartridge(&mut self) -> Option<Cartridge> {
        let cartridge = self.cartridge.take()?;
        // Keep the slots populated until the map stops pointing at them.
        Some(cartridge)
    }

    /// Port back to power-on, images reloaded, map rebuilt at once.
    pub fn reset(&mut self) {
        self.port_ddr = PORT_DDR_POWER_ON;
        self.port_data = PORT_DATA_POWER_ON;
        self.apply_pending_bank();
        self.load_images();
    }

    /// The video chip's 16 KiB view of memory in `bank`.
    #[must_use]
    pub fn video_view(&self, bank: u8) -> VideoView<'_> {
        VideoView {
            ram: &self.ram[..],
            colour: &self.colour[..],
            chargen: if self.banking {
                self.roms.get(usize::from(SLOT_CHARGEN)).map(Vec::as_slice)
            } else {
                None
            },
            bank,
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn save(&self, w: &mut StateWriter) {
        w.put_bytes(&self.ram[..]);
        w.put_bytes(&self.colour[..]);
        w.put_u8(self.port_ddr);
        w.put_u8(self.port_data);
        w.put_u8(self.applied_bank);

        w.put_bool(self.cartridge.is_some());
        if let Some(cartridge) = &self.cartridge {
            w.put_blob(&cartridge.low);
            w.put_bool(cartridge.high.is_some());
            w.put_blob(cartridge.high.as_deref().unwrap_or_default());
        }

        w.put_u32(self.mappings.len() as u32);
        for mapping in &self.mappings {
            w.put_u16(mapping.start);
            w.put_u32(mapping.length);
            let (tag, value) = match mapping.owner {
                Owner::MainRam => (0, 0),
                Owner::ColourRam => (1, 0),
                Owner::Rom(slot) => (2, slot),
                Owner::Chip(chip) => (3, chip.to_u8()),
            };
            w.put_u8(tag);
            w.put_u8(value);
            w.put_bool(mapping.ram_under_rom);
        }
    }

    /// Restore into `self`, which must have been built from the same
    /// configuration.
    pub fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut memory = self.clone();
        memory.ram.copy_from_slice(r.bytes(0x1_0000)?);
        memory.colour.copy_from_slice(r.bytes(COLOUR_RAM_SIZE)?);
        memory.port_ddr = r.u8()?;
        memory.port_data = r.u8()?;
        memory.applied_bank = r.u8()?;

        memory.cartridge = None;
        if r.bool()? {
            let low = r.blob()?.to_vec();
            let has_high = r.bool()?;
            let high = r.blob()?.to_vec();
            let mut image = low;
            if has_high {
                image.extend_from_slice(&high);
            }
            let cartridge = Cartridge::from_image(&image)
                .map_err(|_| StateError::Invalid("cartridge image size"))?;
            memory
                .insert_cartridge(cartridge)
                .map_err(|_| StateError::Invalid("cartridge without a cartridge port"))?;
        }

        let count = r.u32()?;
        let mut map = Vec::new();
        for _ in 0..count {
            let start = r.u16()?;
            let length = r.u32()?;
            let tag = r.u8()?;
            let value = r.u8()?;
            let owner = match tag {
                0 => Owner::MainRam,
                1 => Owner::ColourRam,
                2 => Owner::Rom(value),
                3 => Owner::Chip(
                    ChipId::from_u8(value).ok_or(StateError::Invalid("unknown chip in mapping"))?,
                ),
                _ => return Err(StateError::Invalid("unknown mapping owner")),
            };
            map.push(Mapping {
                start,
                length,
                owner,
                ram_under_rom: r.bool()?,
            });
        }
        memory
            .install_all(map)
            .map_err(|_| StateError::Invalid("memory map"))?;

        *self = memory;
        Ok(())
    }
}

/// [`DmaView`] of a 16 KiB video bank with the character ROM overlay.
pub struct VideoView<'a> {
    ram: &'a [u8],
    colour: &'a [u8],
    chargen: Option<&'a [u8]>,
    bank: u8,
}

impl DmaView for VideoView<'_> {
    fn dma_read(&self, address: u16) -> u8 {
        let address = address & 0x3FFF;
        if self.bank & 0x01 == 0 && (0x1000..0x2000).contains(&address) {
            if let Some(chargen) = self.chargen {
                return chargen[usize::from(address - 0x1000)];
            }
        }
        self.ram[usize::from(self.bank & 0x03) * 0x4000 + usize::from(address)]
    }

    fn dma_read_nybble(&self, address: u16) -> u8 {
        self.colour[usize::from(address) & (COLOUR_RAM_SIZE - 1)] & 0x0F
    }
}
