//! Atari 2600 (VCS) system emulation.
//!
//! Three chips and a cartridge socket:
//!
//! - **CPU**: a 6507, i.e. a 6502 with 13 address lines, clocked at
//!   ~1.19 MHz (NTSC). The generic core comes from `vcs_core`; this crate
//!   supplies the bus that narrows the address space.
//! - **TIA**: video and audio. One pixel per color clock, three color
//!   clocks per CPU cycle, and no framebuffer on the real chip; the
//!   program races the beam.
//! - **RIOT (6532)**: the machine's 128 bytes of RAM, the controller and
//!   console-switch ports, and the interval timer.
//!
//! The [`Console`] owns the whole machine and drives it with the 1:1:3
//! CPU:RIOT:TIA interleave, honoring TIA WSYNC holds. A frame is
//! `CYCLES_PER_FRAME` CPU cycles; VSYNC edges re-anchor the TIA's own
//! notion of where a frame starts inside that window.
//!
//! ```no_run
//! use vcs_atari2600::Console;
//!
//! let rom = std::fs::read("game.a26").unwrap();
//! let mut console = Console::new(&rom).unwrap();
//! console.run_frame();
//! let frame = console.framebuffer();
//! let audio = console.drain_audio();
//! ```

mod bus;
mod cartridge;
mod input;
mod palette;
mod riot;
mod tia;

pub use bus::Bus;
pub use cartridge::{BankScheme, Cartridge, CartridgeError};
pub use input::{ConsoleSwitches, InputState, Joystick};
pub use palette::NTSC_PALETTE;
pub use riot::Riot;
pub use tia::{FrameSync, Tia, TiaDebug};

use serde_json::Value;
use thiserror::Error;
use vcs_core::cpu_6502::Cpu6502;
use vcs_core::types::Frame;
use vcs_core::System;

/// CPU cycles per host frame, roughly one NTSC frame.
pub const CYCLES_PER_FRAME: u32 = 19_876;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("cartridge error: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("unsupported save state: {0}")]
    BadSaveState(String),
}

/// The whole machine.
pub struct Console {
    cpu: Cpu6502<Bus>,
    cycles: u64,
}

impl Console {
    /// Power on with a ROM image. Fails only for an empty image; odd sizes
    /// degrade to a flat 4K mapping.
    pub fn new(rom_bytes: &[u8]) -> Result<Self, ConsoleError> {
        let cart = Cartridge::new(rom_bytes.to_vec())?;
        let mut cpu = Cpu6502::new(Bus::new(cart));
        cpu.reset();
        Ok(Self { cpu, cycles: 0 })
    }

    /// Advance one NTSC frame.
    ///
    /// Per CPU cycle: step the CPU unless the TIA holds it via WSYNC, tick
    /// the RIOT timer, tick the TIA three color clocks.
    pub fn run_frame(&mut self) {
        for _ in 0..CYCLES_PER_FRAME {
            self.clock_cycle();
        }
    }

    fn clock_cycle(&mut self) {
        if !self.cpu.memory.tia.wsync_hold() {
            self.cpu.clock();
        }
        self.cpu.memory.riot.tick();
        self.cpu.memory.tia.tick();
        self.cpu.memory.tia.tick();
        self.cpu.memory.tia.tick();
        self.cycles += 1;
    }

    /// The TIA's framebuffer, stable between `run_frame` calls.
    pub fn framebuffer(&self) -> &Frame {
        self.cpu.memory.tia.framebuffer()
    }

    /// Take all PCM samples accrued since the last drain (44.1 kHz mono).
    pub fn drain_audio(&mut self) -> Vec<i16> {
        self.cpu.memory.tia.audio.drain()
    }

    /// Controller and console-switch state, written by the host.
    pub fn input(&mut self) -> &mut InputState {
        &mut self.cpu.memory.input
    }

    /// Beam position and register shadows for debugging overlays.
    pub fn tia_debug(&self) -> TiaDebug {
        self.cpu.memory.tia.debug()
    }

    pub fn set_ignore_vblank(&mut self, on: bool) {
        self.cpu.memory.tia.set_ignore_vblank(on);
    }

    pub fn set_ignore_visible_window(&mut self, on: bool) {
        self.cpu.memory.tia.set_ignore_visible_window(on);
    }

    /// Cycle the RESP strobe offset through 0, +1, +2, -1; returns the new
    /// offset.
    pub fn cycle_resp_offset(&mut self) -> i16 {
        self.cpu.memory.tia.cycle_resp_offset()
    }

    pub fn set_frame_sync(&mut self, mode: FrameSync) {
        self.cpu.memory.tia.set_sync_mode(mode);
    }

    /// CPU debug counters: total cycles, instructions, unknown opcodes.
    pub fn cpu_counters(&self) -> (u64, u64, u64) {
        (
            self.cpu.total_cycles,
            self.cpu.instructions,
            self.cpu.unknown_opcodes,
        )
    }

    pub fn reset_vector_was_patched(&self) -> bool {
        self.cpu.reset_vector_was_patched
    }
}

impl System for Console {
    type Error = ConsoleError;

    fn reset(&mut self) {
        self.cpu.memory.reset();
        self.cpu.reset();
        self.cycles = 0;
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        self.run_frame();
        Ok(self.framebuffer().clone())
    }

    fn save_state(&self) -> Value {
        serde_json::json!({
            "version": 1,
            "system": "atari2600",
            "cycles": self.cycles,
            "cpu": {
                "a": self.cpu.a,
                "x": self.cpu.x,
                "y": self.cpu.y,
                "sp": self.cpu.sp,
                "status": self.cpu.status,
                "pc": self.cpu.pc,
                "cycles_remaining": self.cpu.cycles_remaining,
            },
            "bus": bus::BusState {
                tia: self.cpu.memory.tia.clone(),
                riot: self.cpu.memory.riot.clone(),
                current_bank: self.cpu.memory.cart.current_bank(),
            },
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        use serde::de::Error as _;

        if v["version"].as_u64() != Some(1) {
            return Err(serde_json::Error::custom("unsupported version"));
        }
        if v["system"].as_str() != Some("atari2600") {
            return Err(serde_json::Error::custom("wrong system tag"));
        }

        let state: bus::BusState = serde_json::from_value(v["bus"].clone())?;
        self.cpu.memory.tia = state.tia;
        self.cpu.memory.riot = state.riot;
        self.cpu.memory.cart.restore_bank(state.current_bank);

        self.cycles = v["cycles"].as_u64().unwrap_or(0);
        let cpu = &v["cpu"];
        self.cpu.a = cpu["a"].as_u64().unwrap_or(0) as u8;
        self.cpu.x = cpu["x"].as_u64().unwrap_or(0) as u8;
        self.cpu.y = cpu["y"].as_u64().unwrap_or(0) as u8;
        self.cpu.sp = cpu["sp"].as_u64().unwrap_or(0xFD) as u8;
        self.cpu.status = cpu["status"].as_u64().unwrap_or(0x24) as u8;
        self.cpu.pc = cpu["pc"].as_u64().unwrap_or(0) as u16;
        self.cpu.cycles_remaining = cpu["cycles_remaining"].as_u64().unwrap_or(0) as u8;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_core::cpu_6502::Memory6502;

    /// 4K ROM with a reset vector pointing at `program` loaded at $F000.
    fn rom_with_program(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 4096];
        rom[..program.len()].copy_from_slice(program);
        rom[0xFFC] = 0x00;
        rom[0xFFD] = 0xF0;
        rom
    }

    #[test]
    fn empty_rom_is_rejected() {
        assert!(Console::new(&[]).is_err());
    }

    #[test]
    fn zeroed_rom_boots_with_patched_vector() {
        let console = Console::new(&vec![0u8; 4096]).unwrap();
        assert!(console.reset_vector_was_patched());
        assert_eq!(console.cpu.pc, 0xF000);
        assert_eq!(console.cpu.sp, 0xFD);
        assert_eq!(console.cpu.status, 0b0010_0100);
    }

    #[test]
    fn f8_cartridge_boots_in_bank_1_and_switches() {
        let mut rom = vec![0u8; 8192];
        rom[0x0000] = 0x11; // bank 0
        rom[0x1000] = 0x22; // bank 1
        let console = Console::new(&rom).unwrap();

        assert_eq!(console.cpu.memory.read(0xF000), 0x22);
        console.cpu.memory.read(0xFFF8);
        assert_eq!(console.cpu.memory.read(0xF000), 0x11);
    }

    #[test]
    fn run_frame_advances_the_expected_time() {
        // NOPs forever.
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();
        console.run_frame();

        let (cycles, instructions, unknown) = console.cpu_counters();
        assert_eq!(cycles, CYCLES_PER_FRAME as u64);
        assert!(instructions > 3000);
        assert_eq!(unknown, 0);

        // 19,876 CPU cycles = 59,628 color clocks = ~261.5 scanlines.
        let debug = console.tia_debug();
        assert!(debug.sl >= 260, "scanline {}", debug.sl);
    }

    #[test]
    fn wsync_stalls_the_cpu_but_not_the_timers() {
        // STA WSYNC / JMP back: one loop iteration per scanline.
        let rom = rom_with_program(&[0x85, 0x02, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();
        console.run_frame();

        let (cycles, instructions, _) = console.cpu_counters();
        // The CPU only ran while not held: far fewer executed cycles than
        // wall-clock cycles.
        assert!(cycles < CYCLES_PER_FRAME as u64 / 3);
        // Roughly two instructions per scanline, ~262 scanlines.
        assert!(instructions > 300 && instructions < 900, "{}", instructions);
        // Wall-clock time still advanced the full frame.
        assert_eq!(console.cycles, CYCLES_PER_FRAME as u64);
    }

    #[test]
    fn audio_buffer_matches_frame_duration() {
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();
        console.run_frame();

        let samples = console.drain_audio();
        // 59,628 color clocks at 3.579545 MHz resampled to 44.1 kHz.
        let expected = (CYCLES_PER_FRAME as f64 * 3.0 * 44_100.0 / 3_579_545.0) as isize;
        let got = samples.len() as isize;
        assert!((got - expected).abs() <= 5, "expected ~{expected}, got {got}");

        // Drained means drained.
        assert!(console.drain_audio().is_empty());
    }

    #[test]
    fn input_is_visible_to_the_program() {
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();

        console.input().joystick.right = true;
        console.input().fire[0] = true;
        assert_eq!(console.cpu.memory.read(0x0280) & 0x80, 0);
        assert_eq!(console.cpu.memory.read(0x003C) & 0x80, 0); // INPT4

        console.input().joystick.right = false;
        assert_eq!(console.cpu.memory.read(0x0280) & 0x80, 0x80);
    }

    #[test]
    fn framebuffer_has_the_advertised_geometry() {
        let console = Console::new(&vec![0u8; 4096]).unwrap();
        let frame = console.framebuffer();
        assert_eq!(frame.width, 160);
        assert_eq!(frame.height, 230);
        assert_eq!(frame.pixels.len(), 160 * 230);
    }

    #[test]
    fn a_program_can_paint_the_playfield() {
        // Kernel: set COLUPF white, PF1 = $FF, then spin on WSYNC.
        let rom = rom_with_program(&[
            0xA9, 0x0E, // LDA #$0E
            0x85, 0x08, // STA COLUPF
            0xA9, 0xFF, // LDA #$FF
            0x85, 0x0E, // STA PF1
            0x85, 0x02, // STA WSYNC
            0x4C, 0x08, 0xF0, // JMP to the WSYNC spin
        ]);
        let mut console = Console::new(&rom).unwrap();
        for _ in 0..3 {
            console.run_frame();
        }

        let frame = console.framebuffer();
        let painted = frame
            .pixels
            .iter()
            .filter(|&&p| p == palette::color(0x0E))
            .count();
        // PF1 covers 32 of 160 pixels per half; expect many painted rows.
        assert!(painted > 1000, "painted {}", painted);
    }

    #[test]
    fn reset_returns_to_power_on_state() {
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();
        console.run_frame();
        console.reset();
        assert_eq!(console.cycles, 0);
        assert_eq!(console.cpu.pc, 0xF000);
        assert_eq!(console.tia_debug().sl, 0);
    }

    #[test]
    fn save_and_load_state_round_trip() {
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();
        console.run_frame();
        let pc = console.cpu.pc;
        let sl = console.tia_debug().sl;
        let state = console.save_state();

        let mut other = Console::new(&rom).unwrap();
        other.load_state(&state).unwrap();
        assert_eq!(other.cpu.pc, pc);
        assert_eq!(other.tia_debug().sl, sl);
        assert_eq!(other.cycles, console.cycles);
    }

    #[test]
    fn load_state_rejects_foreign_payloads() {
        let rom = rom_with_program(&[0xEA]);
        let mut console = Console::new(&rom).unwrap();
        let bad = serde_json::json!({"version": 2, "system": "atari2600"});
        assert!(console.load_state(&bad).is_err());
        let bad = serde_json::json!({"version": 1, "system": "nes"});
        assert!(console.load_state(&bad).is_err());
    }

    #[test]
    fn debug_toggles_round_trip() {
        let rom = rom_with_program(&[0xEA, 0x4C, 0x00, 0xF0]);
        let mut console = Console::new(&rom).unwrap();

        console.set_ignore_vblank(true);
        console.set_ignore_visible_window(true);
        console.set_frame_sync(FrameSync::Fixed262);
        assert_eq!(console.cycle_resp_offset(), 1);

        let debug = console.tia_debug();
        assert!(debug.ignore_vblank);
        assert!(debug.ignore_visible_window);
        assert_eq!(debug.sync_mode, FrameSync::Fixed262);
        assert_eq!(debug.resp_offset, 1);
    }
}
