//! Memory bus and address decoder.
//!
//! The 6507 drives 13 address lines, so everything repeats every 8K. After
//! masking, decoding is done by a handful of address-line tests:
//!
//! - `addr >= $1000`: cartridge ROM window (reads serve ROM, writes only
//!   feed bank-switch hotspots)
//! - `addr < $0200` with low byte `>= $80`: RIOT RAM. The mirror into page
//!   one is what puts the stack ($01xx) in real RAM.
//! - low byte `<= $7F`: TIA, register selected by the low 6 bits
//! - `$0280-$0297`: RIOT I/O and timer
//! - anything else: open bus, reads 0, writes dropped

use serde::{Deserialize, Serialize};
use vcs_core::cpu_6502::Memory6502;

use crate::cartridge::Cartridge;
use crate::input::InputState;
use crate::riot::Riot;
use crate::tia::Tia;

/// The console's bus: TIA, RIOT, cartridge and the shared input state.
#[derive(Debug)]
pub struct Bus {
    pub tia: Tia,
    pub riot: Riot,
    pub cart: Cartridge,
    pub input: InputState,
}

/// Serializable chip state, minus the ROM (the host re-supplies it).
#[derive(Debug, Serialize, Deserialize)]
pub struct BusState {
    pub tia: Tia,
    pub riot: Riot,
    pub current_bank: usize,
}

impl Bus {
    pub fn new(cart: Cartridge) -> Self {
        Self {
            tia: Tia::new(),
            riot: Riot::new(),
            cart,
            input: InputState::new(),
        }
    }

    /// Reset every device; the cartridge returns to its power-on bank.
    pub fn reset(&mut self) {
        self.tia.reset();
        self.riot.reset();
        self.cart.reset();
    }
}

impl Memory6502 for Bus {
    fn read(&self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;

        if addr >= 0x1000 {
            return self.cart.read_rom(addr);
        }
        if addr < 0x0200 && (addr & 0xFF) >= 0x80 {
            return self.riot.read_ram((addr & 0x7F) as u8);
        }
        if (addr & 0xFF) <= 0x7F {
            return self.tia.read((addr & 0x3F) as u8, &self.input);
        }
        if (0x0280..=0x0297).contains(&addr) {
            return self.riot.read_io(addr, &self.input);
        }

        0
    }

    fn write(&mut self, addr: u16, val: u8) {
        let addr = addr & 0x1FFF;

        if addr >= 0x1000 {
            self.cart.write_hotspot(addr);
            return;
        }
        if addr < 0x0200 && (addr & 0xFF) >= 0x80 {
            self.riot.write_ram((addr & 0x7F) as u8, val);
            return;
        }
        if (addr & 0xFF) <= 0x7F {
            self.tia.write((addr & 0x3F) as u8, val);
            return;
        }
        if (0x0280..=0x0297).contains(&addr) {
            self.riot.write_io(addr, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with_rom(rom: Vec<u8>) -> Bus {
        Bus::new(Cartridge::new(rom).unwrap())
    }

    #[test]
    fn ram_mirrors_into_page_zero_and_page_one() {
        let mut bus = bus_with_rom(vec![0; 4096]);

        bus.write(0x0080, 0x12);
        assert_eq!(bus.read(0x0080), 0x12);
        // Page-one mirror: the stack lands in the same 128 bytes.
        assert_eq!(bus.read(0x0180), 0x12);

        bus.write(0x01FF, 0x34);
        assert_eq!(bus.read(0x00FF), 0x34);
    }

    #[test]
    fn thirteen_address_bits_wrap_the_map() {
        let mut bus = bus_with_rom(vec![0; 4096]);
        bus.write(0x0080, 0x55);
        // $2080 masks to $0080.
        assert_eq!(bus.read(0x2080), 0x55);
    }

    #[test]
    fn rom_window_reads_cartridge() {
        let mut rom = vec![0u8; 4096];
        rom[0] = 0x42;
        rom[0xFFF] = 0x43;
        let bus = bus_with_rom(rom);

        assert_eq!(bus.read(0x1000), 0x42);
        assert_eq!(bus.read(0x1FFF), 0x43);
        // The whole upper half of the map is the ROM window.
        assert_eq!(bus.read(0xF000), 0x42);
        assert_eq!(bus.read(0xFFFF), 0x43);
    }

    #[test]
    fn rom_window_writes_reach_hotspots_only() {
        let mut rom = vec![0u8; 8192];
        rom[0x0000] = 0xAA;
        rom[0x1000] = 0xBB;
        let mut bus = bus_with_rom(rom);

        assert_eq!(bus.read(0xF000), 0xBB); // F8 powers on in bank 1
        bus.write(0xFFF8, 0x00);
        assert_eq!(bus.read(0xF000), 0xAA);
        // The write stored nothing.
        assert_eq!(bus.read(0xFFF8), 0x00);
    }

    #[test]
    fn tia_registers_decode_from_low_six_bits() {
        let mut bus = bus_with_rom(vec![0; 4096]);
        // COLUBK via a mirror at $0309 (low byte <= $7F).
        bus.write(0x0309, 0x1E);
        bus.tia.run_ticks(4);
        assert_eq!(bus.tia.debug().colubk, 0x1E);
    }

    #[test]
    fn wsync_write_holds_the_cpu() {
        let mut bus = bus_with_rom(vec![0; 4096]);
        bus.write(0x0002, 0x00);
        assert!(bus.tia.wsync_hold());
    }

    #[test]
    fn riot_io_window_decodes_timer() {
        let mut bus = bus_with_rom(vec![0; 4096]);
        bus.write(0x0294, 10);
        bus.riot.tick();
        assert_eq!(bus.read(0x0284), 9);
    }

    #[test]
    fn unmapped_addresses_read_zero() {
        let mut bus = bus_with_rom(vec![0; 4096]);
        assert_eq!(bus.read(0x02F0), 0);
        // Writes there are dropped without effect.
        bus.write(0x02F0, 0xFF);
        assert_eq!(bus.read(0x02F0), 0);
    }

    #[test]
    fn collision_registers_read_through_tia() {
        let bus = bus_with_rom(vec![0; 4096]);
        assert_eq!(bus.read(0x0030), 0); // CXM0P, clear at power-on
    }
}
