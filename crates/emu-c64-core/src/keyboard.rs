//! Keyboard matrix and joysticks.
//!
//! The keyboard is an 8x8 matrix scanned through CIA1: port A drives the
//! column select (active low) and port B reads the rows (active low).
//! Joystick 2 shares port A and joystick 1 shares port B.

use emu_core::{StateError, StateReader, StateWriter};
use mos_cia_6526::Cia;

/// 8x8 keyboard matrix. Stores 1 = pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardMatrix {
    /// `cols[c]` has bit `r` set if the key at column `c`, row `r` is down.
    cols: [u8; 8],
}

impl KeyboardMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, col: u8, row: u8, pressed: bool) {
        if col < 8 && row < 8 {
            if pressed {
                self.cols[usize::from(col)] |= 1 << row;
            } else {
                self.cols[usize::from(col)] &= !(1 << row);
            }
        }
    }

    #[must_use]
    pub fn is_pressed(&self, col: u8, row: u8) -> bool {
        col < 8 && row < 8 && self.cols[usize::from(col)] & (1 << row) != 0
    }

    #[must_use]
    pub fn columns(&self) -> [u8; 8] {
        self.cols
    }
}

/// Joystick switches, 1 = closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JoystickState(pub u8);

impl JoystickState {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const FIRE: u8 = 0x10;

    /// Levels on the CIA port: closed switches pull bits 0-4 low.
    #[must_use]
    pub fn port_bits(self) -> u8 {
        !(self.0 & 0x1F)
    }
}

/// Everything the host feeds in through the control ports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Input {
    pub keyboard: KeyboardMatrix,
    /// Joystick ports 1 and 2.
    pub joysticks: [JoystickState; 2],
}

impl Input {
    /// Drive CIA1's port pins from the current input state.
    pub fn apply(&self, cia1: &mut Cia) {
        cia1.set_key_matrix(self.keyboard.columns());
        cia1.set_port_a_input(self.joysticks[1].port_bits());
        cia1.set_port_b_input(self.joysticks[0].port_bits());
    }

    pub fn save(&self, w: &mut StateWriter) {
        w.put_bytes(&self.keyboard.cols);
        w.put_u8(self.joysticks[0].0);
        w.put_u8(self.joysticks[1].0);
    }

    pub fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let cols = r.array()?;
        let joy1 = r.u8()?;
        let joy2 = r.u8()?;
        if (joy1 | joy2) & !0x1F != 0 {
            return Err(StateError::Invalid("joystick bits out of range"));
        }
        self.keyboard.cols = cols;
        self.joysticks = [JoystickState(joy1), JoystickState(joy2)];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{Chip, NoDma};

    /// Rows CIA1 reads on port B with `col_mask` driven on port A.
    fn scan(input: &Input, col_mask: u8) -> u8 {
        let mut cia = Cia::new("CIA1", 1);
        input.apply(&mut cia);
        cia.write_register(0x02, 0xFF, 0);
        cia.write_register(0x03, 0x00, 0);
        cia.write_register(0x00, col_mask, 0);
        cia.tick(1, &NoDma);
        cia.peek_register(0x01)
    }

    #[test]
    fn single_key_visible_only_in_its_column() {
        let mut input = Input::default();
        input.keyboard.set_key(1, 1, true);
        assert_eq!(scan(&input, 0xFD), 0xFD);
        assert_eq!(scan(&input, 0xFE), 0xFF);
        input.keyboard.set_key(1, 1, false);
        assert_eq!(scan(&input, 0xFD), 0xFF);
    }

    #[test]
    fn multiple_columns_merge_rows() {
        let mut input = Input::default();
        input.keyboard.set_key(0, 0, true);
        input.keyboard.set_key(2, 3, true);
        assert_eq!(scan(&input, 0xFA), !0x09);
        assert_eq!(scan(&input, 0xFF), 0xFF);
    }

    #[test]
    fn out_of_range_keys_ignored() {
        let mut kbd = KeyboardMatrix::new();
        kbd.set_key(8, 0, true);
        kbd.set_key(0, 8, true);
        assert_eq!(kbd, KeyboardMatrix::new());
        assert!(!kbd.is_pressed(9, 9));
    }

    #[test]
    fn input_drives_cia1_ports() {
        let mut input = Input::default();
        input.keyboard.set_key(3, 4, true);
        input.joysticks[1] = JoystickState(JoystickState::FIRE);
        let mut cia = Cia::new("CIA1", 1);
        input.apply(&mut cia);
        // DDRs are inputs at power-on: joystick 2 shows on port A.
        assert_eq!(cia.peek_register(0x00) & 0x10, 0);
    }

    #[test]
    fn state_round_trip() {
        let mut input = Input::default();
        input.keyboard.set_key(7, 7, true);
        input.joysticks[0] = JoystickState(JoystickState::UP | JoystickState::LEFT);
        let mut w = StateWriter::new();
        input.save(&mut w);
        let bytes = w.into_bytes();

        let mut restored = Input::default();
        restored.load(&mut StateReader::new(&bytes)).expect("load");
        assert_eq!(restored, input);
    }
}
