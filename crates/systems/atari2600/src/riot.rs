//! RIOT (6532) - RAM, I/O ports, and interval timer.
//!
//! The RIOT supplies the machine's only RAM (128 bytes), the two controller
//! ports, and a programmable countdown timer games use for frame pacing.
//!
//! # Timer protocol
//!
//! A write to TIM1T/TIM8T/TIM64T/T1024T ($94-$97) loads the counter, selects
//! the prescale (1/8/64/1024 CPU cycles per decrement), resets the prescale
//! countdown, clears the underflow flag and starts the timer. When INTIM
//! decrements past zero it wraps to $FF, sets the underflow flag, and keeps
//! counting at the same prescale. INSTAT ($85) reports the flag in bit 7;
//! the flag is cleared by the next timer write.

use crate::input::InputState;
use serde::{Deserialize, Serialize};

mod serde_ram {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(arr: &[u8; 128], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        arr.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 128], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        let mut arr = [0u8; 128];
        if vec.len() == 128 {
            arr.copy_from_slice(&vec);
        }
        Ok(arr)
    }
}

/// RIOT chip state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Riot {
    /// 128 bytes of RAM, the only read/write memory in the machine.
    #[serde(with = "serde_ram")]
    ram: [u8; 128],

    /// Port A data direction register (stored, not enforced).
    swacnt: u8,
    /// Port B data direction register.
    swbcnt: u8,

    /// Current timer value.
    intim: u8,
    running: bool,
    underflow: bool,
    /// CPU cycles per INTIM decrement: 1, 8, 64 or 1024.
    prescale: u16,
    prescale_counter: u16,
}

impl Default for Riot {
    fn default() -> Self {
        Self::new()
    }
}

impl Riot {
    pub fn new() -> Self {
        Self {
            ram: [0; 128],
            swacnt: 0,
            swbcnt: 0,
            intim: 0,
            running: false,
            underflow: false,
            prescale: 1,
            prescale_counter: 1,
        }
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// RAM access, `offset` already masked to 0-127.
    pub fn read_ram(&self, offset: u8) -> u8 {
        self.ram[(offset & 0x7F) as usize]
    }

    pub fn write_ram(&mut self, offset: u8, val: u8) {
        self.ram[(offset & 0x7F) as usize] = val;
    }

    /// Read an I/O or timer register. `addr` is the system address within
    /// $0280-$0297; only the low byte matters.
    pub fn read_io(&self, addr: u16, input: &InputState) -> u8 {
        match addr & 0xFF {
            0x80 => input.swcha(),
            0x81 => self.swacnt,
            0x82 => input.swchb(),
            0x83 => self.swbcnt,
            0x84 | 0x86 => self.intim,
            0x85 | 0x87 => {
                if self.underflow {
                    0x80
                } else {
                    0x00
                }
            }
            _ => 0,
        }
    }

    /// Write an I/O or timer register.
    pub fn write_io(&mut self, addr: u16, val: u8) {
        match addr & 0xFF {
            0x81 => self.swacnt = val,
            0x83 => self.swbcnt = val,
            0x94 => self.start_timer(val, 1),
            0x95 => self.start_timer(val, 8),
            0x96 => self.start_timer(val, 64),
            0x97 => self.start_timer(val, 1024),
            // SWCHA/SWCHB are input ports here; writes are dropped.
            _ => {}
        }
    }

    fn start_timer(&mut self, value: u8, prescale: u16) {
        self.intim = value;
        self.prescale = prescale;
        self.prescale_counter = prescale;
        self.underflow = false;
        self.running = true;
    }

    /// Advance the timer by one CPU cycle.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.prescale_counter -= 1;
        if self.prescale_counter == 0 {
            self.prescale_counter = self.prescale;
            if self.intim == 0 {
                self.intim = 0xFF;
                self.underflow = true;
            } else {
                self.intim -= 1;
            }
        }
    }

    pub fn intim(&self) -> u8 {
        self.intim
    }

    pub fn underflow(&self) -> bool {
        self.underflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_n(riot: &mut Riot, n: u32) {
        for _ in 0..n {
            riot.tick();
        }
    }

    #[test]
    fn ram_reads_back_what_was_written() {
        let mut riot = Riot::new();
        riot.write_ram(0x00, 0x42);
        riot.write_ram(0x7F, 0x43);
        assert_eq!(riot.read_ram(0x00), 0x42);
        assert_eq!(riot.read_ram(0x7F), 0x43);
        // Offsets are masked into the 128-byte array.
        assert_eq!(riot.read_ram(0x80), 0x42);
    }

    #[test]
    fn tim1t_counts_every_cycle() {
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0294, 10);
        assert_eq!(riot.read_io(0x0284, &input), 10);

        riot.tick();
        assert_eq!(riot.read_io(0x0284, &input), 9);
        tick_n(&mut riot, 9);
        assert_eq!(riot.read_io(0x0284, &input), 0);
        riot.tick();
        assert_eq!(riot.read_io(0x0284, &input), 0xFF);
        assert_eq!(riot.read_io(0x0285, &input), 0x80);
    }

    #[test]
    fn tim8t_underflow_schedule() {
        // STA TIM8T with A=$02: after 9 cycles INTIM reads $01, after 17
        // it reads $00, after 25 it reads $FF with the underflow flag set.
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0295, 0x02);

        tick_n(&mut riot, 9);
        assert_eq!(riot.read_io(0x0284, &input), 0x01);
        tick_n(&mut riot, 8);
        assert_eq!(riot.read_io(0x0284, &input), 0x00);
        assert_eq!(riot.read_io(0x0285, &input), 0x00);
        tick_n(&mut riot, 8);
        assert_eq!(riot.read_io(0x0284, &input), 0xFF);
        assert_eq!(riot.read_io(0x0285, &input), 0x80);
    }

    #[test]
    fn underflow_keeps_counting_at_the_same_prescale() {
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0296, 0x00);

        tick_n(&mut riot, 64);
        assert_eq!(riot.read_io(0x0284, &input), 0xFF);
        assert!(riot.underflow());
        tick_n(&mut riot, 64);
        assert_eq!(riot.read_io(0x0284, &input), 0xFE);
    }

    #[test]
    fn underflow_flag_persists_until_timer_write() {
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0294, 1);
        tick_n(&mut riot, 2);
        assert_eq!(riot.read_io(0x0285, &input), 0x80);
        // Reads do not clear the flag.
        assert_eq!(riot.read_io(0x0285, &input), 0x80);
        // The next timer write does.
        riot.write_io(0x0294, 5);
        assert_eq!(riot.read_io(0x0285, &input), 0x00);
    }

    #[test]
    fn timer_intervals_scale_the_prescale() {
        let mut riot = Riot::new();
        let input = InputState::new();

        riot.write_io(0x0295, 5);
        tick_n(&mut riot, 8);
        assert_eq!(riot.read_io(0x0284, &input), 4);

        riot.write_io(0x0296, 5);
        tick_n(&mut riot, 64);
        assert_eq!(riot.read_io(0x0284, &input), 4);

        riot.write_io(0x0297, 5);
        tick_n(&mut riot, 1024);
        assert_eq!(riot.read_io(0x0284, &input), 4);
    }

    #[test]
    fn ports_reflect_input_state() {
        let riot = Riot::new();
        let mut input = InputState::new();
        assert_eq!(riot.read_io(0x0280, &input), 0xFF);

        input.joystick.left = true;
        assert_eq!(riot.read_io(0x0280, &input) & 0x40, 0x00);

        input.switches.select = true;
        assert_eq!(riot.read_io(0x0282, &input) & 0x02, 0x00);
    }

    #[test]
    fn ddr_registers_store_and_read_back() {
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0281, 0xF0);
        riot.write_io(0x0283, 0x0F);
        assert_eq!(riot.read_io(0x0281, &input), 0xF0);
        assert_eq!(riot.read_io(0x0283, &input), 0x0F);
    }

    #[test]
    fn intim_mirrors_read_the_timer() {
        let mut riot = Riot::new();
        let input = InputState::new();
        riot.write_io(0x0294, 7);
        assert_eq!(riot.read_io(0x0286, &input), 7);
        tick_n(&mut riot, 8);
        assert_eq!(riot.read_io(0x0287, &input), 0x00);
    }
}
