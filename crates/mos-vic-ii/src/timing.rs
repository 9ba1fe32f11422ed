//! Raster geometry per video standard.

/// Video standard: PAL 6569 or NTSC 6567.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoStandard {
    /// 63 cycles x 312 lines.
    #[default]
    Pal,
    /// 65 cycles x 263 lines.
    Ntsc,
}

impl VideoStandard {
    #[must_use]
    pub const fn cycles_per_line(self) -> u8 {
        match self {
            Self::Pal => 63,
            Self::Ntsc => 65,
        }
    }

    #[must_use]
    pub const fn lines_per_frame(self) -> u16 {
        match self {
            Self::Pal => 312,
            Self::Ntsc => 263,
        }
    }

    #[must_use]
    pub const fn cycles_per_frame(self) -> u32 {
        self.cycles_per_line() as u32 * self.lines_per_frame() as u32
    }

    /// Line cycle at which sprite DMA for the next line begins.
    #[must_use]
    pub const fn sprite_dma_cycle(self) -> u8 {
        match self {
            Self::Pal => 58,
            Self::Ntsc => 60,
        }
    }

    /// Visible raster lines, `[first, last)`.
    #[must_use]
    pub const fn visible_lines(self) -> (u16, u16) {
        match self {
            Self::Pal => (6, 290),
            Self::Ntsc => (28, 262),
        }
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Pal => 0,
            Self::Ntsc => 1,
        }
    }
}

/// First visible cycle of a line (left border start).
pub const FIRST_VISIBLE_CYCLE: u8 = 10;

/// Last visible cycle, exclusive.
pub const LAST_VISIBLE_CYCLE: u8 = 62;

/// Visible width in pixels.
pub const VISIBLE_WIDTH: u16 = (LAST_VISIBLE_CYCLE - FIRST_VISIBLE_CYCLE) as u16 * 8;

/// Badline character fetch window, `[first, last]` line cycles.
pub const BADLINE_FIRST_CYCLE: u8 = 15;
pub const BADLINE_STALL_CYCLES: u32 = 40;

/// Raster lines on which badlines can occur.
pub const DISPLAY_FIRST_LINE: u16 = 0x30;
pub const DISPLAY_LAST_LINE: u16 = 0xF7;
