//! Pixel pipeline: graphics modes, sprites, collisions and border.
//!
//! Coordinates inside a line use the sprite X system: the 40-column
//! display window spans X 24-343, reached at line cycle 16.

use emu_core::DmaView;

use crate::timing::{FIRST_VISIBLE_CYCLE, LAST_VISIBLE_CYCLE};
use crate::{IRQ_SPRITE_BACKGROUND, IRQ_SPRITE_SPRITE, Vic, VideoEvent};

/// Line cycle at which sprite X 24 is drawn.
const DISPLAY_START_CYCLE: i16 = 16;
const DISPLAY_START_X: i16 = 24;

impl Vic {
    /// Render the 8 pixels of the current beam position, if visible.
    pub(crate) fn render_cycle(&mut self, now: u64, dma: &dyn DmaView) {
        let (first_line, last_line) = self.standard.visible_lines();
        if !(first_line..last_line).contains(&self.raster_line)
            || !(FIRST_VISIBLE_CYCLE..LAST_VISIBLE_CYCLE).contains(&self.raster_cycle)
        {
            return;
        }

        let border = self.latched[0x20] & 0x0F;
        let background = self.latched[0x21] & 0x0F;
        let vertical_border = self.in_vertical_border();
        let displaying = self.displaying();
        let (left, right) = if self.latched[0x16] & 0x08 != 0 {
            (24, 344)
        } else {
            (31, 335)
        };
        let xscroll = i16::from(self.latched[0x16] & 0x07);
        let first_x =
            (i16::from(self.raster_cycle) - DISPLAY_START_CYCLE) * 8 + DISPLAY_START_X;

        let mut colours = [0u8; 8];
        let mut sprite_sprite = 0u8;
        let mut sprite_bg = 0u8;
        let mut fetched: Option<(usize, u8)> = None;

        for (px, colour) in colours.iter_mut().enumerate() {
            let x = first_x + px as i16;
            let gx = x - DISPLAY_START_X - xscroll;
            let (mut pen, foreground) = if displaying && (0..320).contains(&gx) {
                self.graphics_pixel(gx as usize, dma, &mut fetched)
            } else {
                (background, false)
            };

            let mut coverage = 0u8;
            let mut winner = None;
            for i in 0..8 {
                if let Some(sprite_pen) = self.sprite_pixel(i, x) {
                    coverage |= 1 << i;
                    if winner.is_none() {
                        winner = Some((i, sprite_pen));
                    }
                }
            }
            if coverage.count_ones() >= 2 {
                sprite_sprite |= coverage;
            }
            if foreground {
                sprite_bg |= coverage;
            }
            if let Some((i, sprite_pen)) = winner {
                let behind = self.latched[0x1B] & (1 << i) != 0;
                if !(behind && foreground) {
                    pen = sprite_pen;
                }
            }

            *colour = if vertical_border || x < left || x >= right {
                border
            } else {
                pen
            };
        }

        self.events.push(
            now,
            VideoEvent::Pixels {
                line: self.raster_line,
                x: u16::from(self.raster_cycle - FIRST_VISIBLE_CYCLE) * 8,
                colours,
            },
        );

        self.sprite_sprite_collision |= sprite_sprite;
        self.sprite_bg_collision |= sprite_bg;
        if self.sprite_sprite_collision != 0 && !self.sprite_sprite_irq_latched {
            self.sprite_sprite_irq_latched = true;
            self.irq_status |= IRQ_SPRITE_SPRITE;
        }
        if self.sprite_bg_collision != 0 && !self.sprite_bg_irq_latched {
            self.sprite_bg_irq_latched = true;
            self.irq_status |= IRQ_SPRITE_BACKGROUND;
        }
    }

    /// Top and bottom border, by RSEL: 25 rows show lines 51-250, 24 rows
    /// lines 55-246.
    fn in_vertical_border(&self) -> bool {
        let (top, bottom) = if self.latched[0x11] & 0x08 != 0 {
            (51, 251)
        } else {
            (55, 247)
        };
        !self.den_latch || self.raster_line < top || self.raster_line >= bottom
    }

    /// Colour and foreground bit of graphics pixel `gx` (0-319).
    fn graphics_pixel(
        &self,
        gx: usize,
        dma: &dyn DmaView,
        fetched: &mut Option<(usize, u8)>,
    ) -> (u8, bool) {
        let col = gx / 8;
        let bit = gx % 8;
        let code = self.screen_row[col];
        let colour = self.colour_row[col];

        let ecm = self.latched[0x11] & 0x40 != 0;
        let bmm = self.latched[0x11] & 0x20 != 0;
        let mcm = self.latched[0x16] & 0x10 != 0;

        let data = match *fetched {
            Some((c, data)) if c == col => data,
            _ => {
                let data = self.fetch_graphics(col, code, ecm, bmm, dma);
                *fetched = Some((col, data));
                data
            }
        };

        let multicolour = mcm && (bmm || colour & 0x08 != 0);
        let (index, foreground) = if multicolour {
            let pair = (data >> (6 - (bit & 6))) & 0x03;
            // Pair 01 counts as background for priority and collisions.
            (pair, pair >= 2)
        } else {
            let pixel = (data >> (7 - bit)) & 0x01;
            (pixel, pixel != 0)
        };

        let bg = |n: u8| self.latched[0x21 + usize::from(n)] & 0x0F;
        let pen = if ecm && (bmm || mcm) {
            0
        } else if bmm && mcm {
            match index {
                0 => bg(0),
                1 => code >> 4,
                2 => code & 0x0F,
                _ => colour,
            }
        } else if bmm {
            if index != 0 { code >> 4 } else { code & 0x0F }
        } else if ecm {
            if index != 0 { colour } else { bg(code >> 6) }
        } else if multicolour {
            match index {
                0 => bg(0),
                1 => bg(1),
                2 => bg(2),
                _ => colour & 0x07,
            }
        } else if index != 0 {
            colour
        } else {
            bg(0)
        };
        (pen, foreground)
    }

    /// Character or bitmap byte for column `col` on the current pixel row.
    fn fetch_graphics(&self, col: usize, code: u8, ecm: bool, bmm: bool, dma: &dyn DmaView) -> u8 {
        let row = u16::from(self.char_row);
        let mut address = if bmm {
            let index = (u16::from(self.text_row) * 40 + col as u16) & 0x03FF;
            self.bitmap_base() + index * 8 + row
        } else {
            let code = if ecm { code & 0x3F } else { code };
            self.char_base() + u16::from(code) * 8 + row
        };
        if ecm {
            // ECM holds address lines 9 and 10 low.
            address &= 0x39FF;
        }
        dma.dma_read(address & 0x3FFF)
    }

    /// Pen of sprite `i` at sprite X coordinate `x`, `None` if transparent.
    fn sprite_pixel(&self, i: usize, x: i16) -> Option<u8> {
        if self.sprite_active & (1 << i) == 0 {
            return None;
        }
        let msb = if self.latched[0x10] & (1 << i) != 0 {
            0x100
        } else {
            0
        };
        let sprite_x = i16::from(self.latched[i * 2]) | msb;
        let expanded = self.latched[0x1D] & (1 << i) != 0;
        let width = if expanded { 48 } else { 24 };
        let offset = x - sprite_x;
        if !(0..width).contains(&offset) {
            return None;
        }

        let pos = if expanded { offset / 2 } else { offset } as usize;
        let data = &self.sprite_data[i];
        let colour = self.latched[0x27 + i] & 0x0F;
        if self.latched[0x1C] & (1 << i) != 0 {
            let pair = pos / 2;
            match (data[pair / 4] >> (6 - (pair % 4) * 2)) & 0x03 {
                0b00 => None,
                0b01 => Some(self.latched[0x25] & 0x0F),
                0b10 => Some(colour),
                _ => Some(self.latched[0x26] & 0x0F),
            }
        } else if data[pos / 8] & (0x80 >> (pos % 8)) != 0 {
            Some(colour)
        } else {
            None
        }
    }
}
