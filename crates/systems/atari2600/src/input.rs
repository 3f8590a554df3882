//! Shared controller and console-switch state.
//!
//! The host writes this struct between frames; the RIOT composes SWCHA and
//! SWCHB from it on every read and the TIA reads the fire buttons for
//! INPT4/INPT5. All port bits are active-low on the wire, so the booleans
//! here use the friendlier "true = pressed / enabled" convention and the
//! chips invert while composing the register bytes.

use serde::{Deserialize, Serialize};

/// Player 0 joystick directions plus both fire buttons, and the console
/// switches on the back panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputState {
    pub joystick: Joystick,
    /// Fire buttons for player 0 and player 1 (TIA INPT4/INPT5).
    pub fire: [bool; 2],
    pub switches: ConsoleSwitches,
}

/// Player 0 joystick directions. Player 1's directions live in the lower
/// nibble of SWCHA but are not wired to a controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Joystick {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Console switches (SWCHB). Difficulty switches read 0 in the B
/// (amateur) position; color reads 1 when the Color/BW switch is on Color.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsoleSwitches {
    pub reset: bool,
    pub select: bool,
    pub color: bool,
    pub p0_difficulty_a: bool,
    pub p1_difficulty_a: bool,
}

impl Default for ConsoleSwitches {
    fn default() -> Self {
        Self {
            reset: false,
            select: false,
            color: true,
            p0_difficulty_a: false,
            p1_difficulty_a: false,
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose the SWCHA byte: P0 Right=bit7, Left=bit6, Down=bit5, Up=bit4,
    /// active-low. The unwired P1 nibble reads released.
    pub fn swcha(&self) -> u8 {
        let mut v = 0xFFu8;
        if self.joystick.right {
            v &= !0x80;
        }
        if self.joystick.left {
            v &= !0x40;
        }
        if self.joystick.down {
            v &= !0x20;
        }
        if self.joystick.up {
            v &= !0x10;
        }
        v
    }

    /// Compose the SWCHB byte: bit0=Reset, bit1=Select, bit3=Color/BW,
    /// bit6/bit7=difficulty. Buttons are active-low; unused bits read 1.
    pub fn swchb(&self) -> u8 {
        let mut v = 0xFFu8;
        if self.switches.reset {
            v &= !0x01;
        }
        if self.switches.select {
            v &= !0x02;
        }
        if !self.switches.color {
            v &= !0x08;
        }
        if !self.switches.p0_difficulty_a {
            v &= !0x40;
        }
        if !self.switches.p1_difficulty_a {
            v &= !0x80;
        }
        v
    }

    /// INPT4/INPT5 byte for a player: bit 7 low while the button is held.
    pub fn inpt(&self, player: usize) -> u8 {
        if self.fire[player & 1] {
            0x00
        } else {
            0x80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_ports_read_released() {
        let input = InputState::new();
        assert_eq!(input.swcha(), 0xFF);
        // Color on, both difficulties B, reset/select released.
        assert_eq!(input.swchb(), 0b0011_1111);
        assert_eq!(input.inpt(0), 0x80);
        assert_eq!(input.inpt(1), 0x80);
    }

    #[test]
    fn directions_pull_their_bits_low() {
        let mut input = InputState::new();
        input.joystick.right = true;
        assert_eq!(input.swcha(), 0x7F);
        input.joystick.up = true;
        assert_eq!(input.swcha(), 0x6F);
        // P1 nibble stays released.
        assert_eq!(input.swcha() & 0x0F, 0x0F);
    }

    #[test]
    fn switches_compose_swchb() {
        let mut input = InputState::new();
        input.switches.reset = true;
        assert_eq!(input.swchb() & 0x01, 0);
        input.switches.select = true;
        assert_eq!(input.swchb() & 0x02, 0);
        input.switches.color = false;
        assert_eq!(input.swchb() & 0x08, 0);
        input.switches.p0_difficulty_a = true;
        assert_eq!(input.swchb() & 0x40, 0x40);
    }

    #[test]
    fn fire_buttons_drive_inpt() {
        let mut input = InputState::new();
        input.fire[0] = true;
        assert_eq!(input.inpt(0), 0x00);
        assert_eq!(input.inpt(1), 0x80);
        input.fire[1] = true;
        assert_eq!(input.inpt(1), 0x00);
    }
}
