//! Cartridge handling and bank switching.
//!
//! The 6507 sees cartridge ROM through a 4K window at $1000-$1FFF. Larger
//! images multiplex 4K banks into that window, switched by touching "hotspot"
//! addresses inside the window itself. Hotspots trigger on *any* access:
//! some kernels bank-switch by reading $1FF8, so the read path must observe
//! the access before serving the byte.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image is empty")]
    BadRomSize,
}

/// Banking scheme, detected from the image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankScheme {
    /// 2K (mirrored) or 4K image, no banking.
    Flat,
    /// 8K, two 4K banks, hotspots $1FF8/$1FF9. Powers on in bank 1.
    F8,
    /// 16K, four 4K banks, hotspots $1FF6-$1FF9. Powers on in bank 0.
    F6,
}

impl BankScheme {
    fn power_on_bank(self) -> usize {
        match self {
            BankScheme::Flat => 0,
            BankScheme::F8 => 1,
            BankScheme::F6 => 0,
        }
    }
}

/// A cartridge: immutable ROM bytes plus the currently selected bank.
///
/// The bank index lives in a `Cell` because hotspots must fire on the read
/// path, which the bus reaches through `&self`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    rom: Vec<u8>,
    scheme: BankScheme,
    current_bank: Cell<usize>,
}

impl Cartridge {
    /// Build a cartridge from a raw image. 2K/4K/8K/16K images map to their
    /// schemes; any other non-zero size degrades to a flat 4K view of the
    /// first 4K bytes (zero padded when shorter).
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let (rom, scheme) = match rom.len() {
            0 => return Err(CartridgeError::BadRomSize),
            2048 | 4096 => (rom, BankScheme::Flat),
            8192 => (rom, BankScheme::F8),
            16384 => (rom, BankScheme::F6),
            _ => {
                let mut flat = rom;
                flat.resize(4096, 0);
                (flat, BankScheme::Flat)
            }
        };

        Ok(Self {
            current_bank: Cell::new(scheme.power_on_bank()),
            rom,
            scheme,
        })
    }

    /// Read a byte from the ROM window. The hotspot check runs first so a
    /// read of the hotspot address serves the byte from the new bank.
    pub fn read_rom(&self, addr: u16) -> u8 {
        self.observe_access(addr);
        let offset = (addr & 0x0FFF) as usize;
        match self.scheme {
            BankScheme::Flat => {
                // 2K images mirror to fill the window.
                self.rom[offset % self.rom.len()]
            }
            BankScheme::F8 | BankScheme::F6 => self.rom[self.current_bank.get() * 4096 + offset],
        }
    }

    /// A write into the ROM window. Nothing is stored; only hotspots react.
    pub fn write_hotspot(&mut self, addr: u16) {
        self.observe_access(addr);
    }

    /// Switch banks when the access lands on a hotspot for this scheme.
    fn observe_access(&self, addr: u16) {
        let offset = addr & 0x0FFF;
        match self.scheme {
            BankScheme::Flat => {}
            BankScheme::F8 => match offset {
                0x0FF8 => self.current_bank.set(0),
                0x0FF9 => self.current_bank.set(1),
                _ => {}
            },
            BankScheme::F6 => {
                if (0x0FF6..=0x0FF9).contains(&offset) {
                    self.current_bank.set((offset - 0x0FF6) as usize);
                }
            }
        }
    }

    /// Re-select the power-on bank (console reset).
    pub fn reset(&mut self) {
        self.current_bank.set(self.scheme.power_on_bank());
    }

    /// Restore a bank selection from a save state, clamped to the image's
    /// bank count.
    pub fn restore_bank(&mut self, bank: usize) {
        let banks = (self.rom.len() / 4096).max(1);
        self.current_bank.set(bank.min(banks - 1));
    }

    pub fn scheme(&self) -> BankScheme {
        self.scheme
    }

    pub fn current_bank(&self) -> usize {
        self.current_bank.get()
    }

    pub fn size(&self) -> usize {
        self.rom.len()
    }
}
