//! The closed set of peripheral chips on the machine.

use drive_gcr_controller::DiskController;
use emu_core::{Chip, InterruptClass, InterruptLines};
use mos_cia_6526::Cia;
use mos_sid_6581::Sid;
use mos_vic_ii::Vic;

use crate::config::MachineConfig;

/// Identifies one peripheral chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChipId {
    Vic,
    Sid,
    Cia1,
    Cia2,
    Disk,
}

impl ChipId {
    /// Every chip, in the default tick order.
    pub const ALL: [Self; 5] = [Self::Vic, Self::Sid, Self::Cia1, Self::Cia2, Self::Disk];

    /// Interrupt class the chip's output is wired to.
    #[must_use]
    pub const fn interrupt_class(self) -> InterruptClass {
        match self {
            Self::Cia2 => InterruptClass::NonMaskable,
            _ => InterruptClass::Maskable,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vic => "vic",
            Self::Sid => "sid",
            Self::Cia1 => "cia1",
            Self::Cia2 => "cia2",
            Self::Disk => "disk",
        }
    }

    pub(crate) const fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

/// Every peripheral chip, owned by value.
#[derive(Debug, Clone)]
pub struct Chips {
    pub vic: Vic,
    pub sid: Sid,
    pub cia1: Cia,
    pub cia2: Cia,
    pub disk: DiskController,
}

impl Chips {
    #[must_use]
    pub fn new(config: &MachineConfig) -> Self {
        let timing = config.timing.params();
        Self {
            vic: Vic::new(timing.standard, config.video_capacity),
            sid: Sid::new(
                config.sid_model,
                timing.cpu_hz,
                config.sample_rate,
                config.audio_capacity,
            ),
            cia1: Cia::new("CIA1", config.tod_tick_cycles),
            cia2: Cia::new("CIA2", config.tod_tick_cycles),
            disk: DiskController::new(timing.cpu_hz),
        }
    }

    #[must_use]
    pub fn get(&self, id: ChipId) -> &dyn Chip {
        match id {
            ChipId::Vic => &self.vic,
            ChipId::Sid => &self.sid,
            ChipId::Cia1 => &self.cia1,
            ChipId::Cia2 => &self.cia2,
            ChipId::Disk => &self.disk,
        }
    }

    pub fn get_mut(&mut self, id: ChipId) -> &mut dyn Chip {
        match id {
            ChipId::Vic => &mut self.vic,
            ChipId::Sid => &mut self.sid,
            ChipId::Cia1 => &mut self.cia1,
            ChipId::Cia2 => &mut self.cia2,
            ChipId::Disk => &mut self.disk,
        }
    }

    /// OR every chip's interrupt output into its class.
    #[must_use]
    pub fn resolve_lines(&self) -> InterruptLines {
        let mut lines = InterruptLines::NONE;
        for id in ChipId::ALL {
            if self.get(id).irq_asserted() {
                lines.assert(id.interrupt_class());
            }
        }
        lines
    }

    /// VIC-II bank selected by CIA2 port A bits 0-1 (inverted).
    #[must_use]
    pub fn video_bank(&self) -> u8 {
        !self.cia2.port_a_output() & 0x03
    }
}
