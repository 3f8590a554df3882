//! MOS 6502 CPU core implementation.
//!
//! This module provides a reusable 6502 CPU implementation that can be used
//! by any system by implementing the `Memory6502` trait. The 2600's 6507 is
//! a 6502 die in a smaller package; address-bus narrowing happens in the
//! system's bus, not here.
//!
//! Execution follows a per-cycle pacing contract: `clock()` is called once
//! per CPU cycle. A new instruction is fetched, decoded and executed in full
//! on the first cycle of its window, and `cycles_remaining` burns down the
//! remaining cycles so that bus traffic stays aligned with the instruction
//! boundaries the rest of the machine observes.
//!
//! Dispatch goes through a fixed 256-entry table of tagged opcode
//! descriptors; the work itself is done by plain functions taking the CPU
//! by `&mut`. Undocumented opcodes execute as NOP and bump a counter.

use crate::logging::{log, LogCategory, LogLevel};

/// Memory interface trait for the 6502 CPU.
///
/// Reads take `&self`; devices with read side effects (bank-switch
/// hotspots, latched flags) use interior mutability.
pub trait Memory6502 {
    /// Read a byte from memory at the given address.
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory at the given address.
    fn write(&mut self, addr: u16, val: u8);
}

pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

/// PC substituted when the cartridge carries an all-zero reset vector.
const PATCHED_RESET_PC: u16 = 0xF000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Indirect,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    /// Undocumented opcode; executes as NOP and increments a counter.
    Unknown,
}

/// One entry of the dispatch table.
#[derive(Debug, Clone, Copy)]
struct OpcodeDesc {
    mnemonic: Mnemonic,
    mode: Mode,
    cycles: u8,
    /// One extra cycle when the effective address crosses a page
    /// (read-style instructions only).
    page_penalty: bool,
}

const UNKNOWN_OP: OpcodeDesc = OpcodeDesc {
    mnemonic: Mnemonic::Unknown,
    mode: Mode::Implied,
    cycles: 2,
    page_penalty: false,
};

const fn op(mnemonic: Mnemonic, mode: Mode, cycles: u8, page_penalty: bool) -> OpcodeDesc {
    OpcodeDesc {
        mnemonic,
        mode,
        cycles,
        page_penalty,
    }
}

const fn build_opcode_table() -> [OpcodeDesc; 256] {
    use Mnemonic::*;
    use Mode::*;

    let mut t = [UNKNOWN_OP; 256];

    t[0x69] = op(Adc, Immediate, 2, false);
    t[0x65] = op(Adc, ZeroPage, 3, false);
    t[0x75] = op(Adc, ZeroPageX, 4, false);
    t[0x6D] = op(Adc, Absolute, 4, false);
    t[0x7D] = op(Adc, AbsoluteX, 4, true);
    t[0x79] = op(Adc, AbsoluteY, 4, true);
    t[0x61] = op(Adc, IndirectX, 6, false);
    t[0x71] = op(Adc, IndirectY, 5, true);

    t[0x29] = op(And, Immediate, 2, false);
    t[0x25] = op(And, ZeroPage, 3, false);
    t[0x35] = op(And, ZeroPageX, 4, false);
    t[0x2D] = op(And, Absolute, 4, false);
    t[0x3D] = op(And, AbsoluteX, 4, true);
    t[0x39] = op(And, AbsoluteY, 4, true);
    t[0x21] = op(And, IndirectX, 6, false);
    t[0x31] = op(And, IndirectY, 5, true);

    t[0x0A] = op(Asl, Accumulator, 2, false);
    t[0x06] = op(Asl, ZeroPage, 5, false);
    t[0x16] = op(Asl, ZeroPageX, 6, false);
    t[0x0E] = op(Asl, Absolute, 6, false);
    t[0x1E] = op(Asl, AbsoluteX, 7, false);

    t[0x90] = op(Bcc, Relative, 2, false);
    t[0xB0] = op(Bcs, Relative, 2, false);
    t[0xF0] = op(Beq, Relative, 2, false);
    t[0x30] = op(Bmi, Relative, 2, false);
    t[0xD0] = op(Bne, Relative, 2, false);
    t[0x10] = op(Bpl, Relative, 2, false);
    t[0x50] = op(Bvc, Relative, 2, false);
    t[0x70] = op(Bvs, Relative, 2, false);

    t[0x24] = op(Bit, ZeroPage, 3, false);
    t[0x2C] = op(Bit, Absolute, 4, false);

    t[0x00] = op(Brk, Implied, 7, false);

    t[0x18] = op(Clc, Implied, 2, false);
    t[0xD8] = op(Cld, Implied, 2, false);
    t[0x58] = op(Cli, Implied, 2, false);
    t[0xB8] = op(Clv, Implied, 2, false);

    t[0xC9] = op(Cmp, Immediate, 2, false);
    t[0xC5] = op(Cmp, ZeroPage, 3, false);
    t[0xD5] = op(Cmp, ZeroPageX, 4, false);
    t[0xCD] = op(Cmp, Absolute, 4, false);
    t[0xDD] = op(Cmp, AbsoluteX, 4, true);
    t[0xD9] = op(Cmp, AbsoluteY, 4, true);
    t[0xC1] = op(Cmp, IndirectX, 6, false);
    t[0xD1] = op(Cmp, IndirectY, 5, true);

    t[0xE0] = op(Cpx, Immediate, 2, false);
    t[0xE4] = op(Cpx, ZeroPage, 3, false);
    t[0xEC] = op(Cpx, Absolute, 4, false);

    t[0xC0] = op(Cpy, Immediate, 2, false);
    t[0xC4] = op(Cpy, ZeroPage, 3, false);
    t[0xCC] = op(Cpy, Absolute, 4, false);

    t[0xC6] = op(Dec, ZeroPage, 5, false);
    t[0xD6] = op(Dec, ZeroPageX, 6, false);
    t[0xCE] = op(Dec, Absolute, 6, false);
    t[0xDE] = op(Dec, AbsoluteX, 7, false);

    t[0xCA] = op(Dex, Implied, 2, false);
    t[0x88] = op(Dey, Implied, 2, false);

    t[0x49] = op(Eor, Immediate, 2, false);
    t[0x45] = op(Eor, ZeroPage, 3, false);
    t[0x55] = op(Eor, ZeroPageX, 4, false);
    t[0x4D] = op(Eor, Absolute, 4, false);
    t[0x5D] = op(Eor, AbsoluteX, 4, true);
    t[0x59] = op(Eor, AbsoluteY, 4, true);
    t[0x41] = op(Eor, IndirectX, 6, false);
    t[0x51] = op(Eor, IndirectY, 5, true);

    t[0xE6] = op(Inc, ZeroPage, 5, false);
    t[0xF6] = op(Inc, ZeroPageX, 6, false);
    t[0xEE] = op(Inc, Absolute, 6, false);
    t[0xFE] = op(Inc, AbsoluteX, 7, false);

    t[0xE8] = op(Inx, Implied, 2, false);
    t[0xC8] = op(Iny, Implied, 2, false);

    t[0x4C] = op(Jmp, Absolute, 3, false);
    t[0x6C] = op(Jmp, Indirect, 5, false);
    t[0x20] = op(Jsr, Absolute, 6, false);

    t[0xA9] = op(Lda, Immediate, 2, false);
    t[0xA5] = op(Lda, ZeroPage, 3, false);
    t[0xB5] = op(Lda, ZeroPageX, 4, false);
    t[0xAD] = op(Lda, Absolute, 4, false);
    t[0xBD] = op(Lda, AbsoluteX, 4, true);
    t[0xB9] = op(Lda, AbsoluteY, 4, true);
    t[0xA1] = op(Lda, IndirectX, 6, false);
    t[0xB1] = op(Lda, IndirectY, 5, true);

    t[0xA2] = op(Ldx, Immediate, 2, false);
    t[0xA6] = op(Ldx, ZeroPage, 3, false);
    t[0xB6] = op(Ldx, ZeroPageY, 4, false);
    t[0xAE] = op(Ldx, Absolute, 4, false);
    t[0xBE] = op(Ldx, AbsoluteY, 4, true);

    t[0xA0] = op(Ldy, Immediate, 2, false);
    t[0xA4] = op(Ldy, ZeroPage, 3, false);
    t[0xB4] = op(Ldy, ZeroPageX, 4, false);
    t[0xAC] = op(Ldy, Absolute, 4, false);
    t[0xBC] = op(Ldy, AbsoluteX, 4, true);

    t[0x4A] = op(Lsr, Accumulator, 2, false);
    t[0x46] = op(Lsr, ZeroPage, 5, false);
    t[0x56] = op(Lsr, ZeroPageX, 6, false);
    t[0x4E] = op(Lsr, Absolute, 6, false);
    t[0x5E] = op(Lsr, AbsoluteX, 7, false);

    t[0xEA] = op(Nop, Implied, 2, false);

    t[0x09] = op(Ora, Immediate, 2, false);
    t[0x05] = op(Ora, ZeroPage, 3, false);
    t[0x15] = op(Ora, ZeroPageX, 4, false);
    t[0x0D] = op(Ora, Absolute, 4, false);
    t[0x1D] = op(Ora, AbsoluteX, 4, true);
    t[0x19] = op(Ora, AbsoluteY, 4, true);
    t[0x01] = op(Ora, IndirectX, 6, false);
    t[0x11] = op(Ora, IndirectY, 5, true);

    t[0x48] = op(Pha, Implied, 3, false);
    t[0x08] = op(Php, Implied, 3, false);
    t[0x68] = op(Pla, Implied, 4, false);
    t[0x28] = op(Plp, Implied, 4, false);

    t[0x2A] = op(Rol, Accumulator, 2, false);
    t[0x26] = op(Rol, ZeroPage, 5, false);
    t[0x36] = op(Rol, ZeroPageX, 6, false);
    t[0x2E] = op(Rol, Absolute, 6, false);
    t[0x3E] = op(Rol, AbsoluteX, 7, false);

    t[0x6A] = op(Ror, Accumulator, 2, false);
    t[0x66] = op(Ror, ZeroPage, 5, false);
    t[0x76] = op(Ror, ZeroPageX, 6, false);
    t[0x6E] = op(Ror, Absolute, 6, false);
    t[0x7E] = op(Ror, AbsoluteX, 7, false);

    t[0x40] = op(Rti, Implied, 6, false);
    t[0x60] = op(Rts, Implied, 6, false);

    t[0xE9] = op(Sbc, Immediate, 2, false);
    t[0xE5] = op(Sbc, ZeroPage, 3, false);
    t[0xF5] = op(Sbc, ZeroPageX, 4, false);
    t[0xED] = op(Sbc, Absolute, 4, false);
    t[0xFD] = op(Sbc, AbsoluteX, 4, true);
    t[0xF9] = op(Sbc, AbsoluteY, 4, true);
    t[0xE1] = op(Sbc, IndirectX, 6, false);
    t[0xF1] = op(Sbc, IndirectY, 5, true);

    t[0x38] = op(Sec, Implied, 2, false);
    t[0xF8] = op(Sed, Implied, 2, false);
    t[0x78] = op(Sei, Implied, 2, false);

    t[0x85] = op(Sta, ZeroPage, 3, false);
    t[0x95] = op(Sta, ZeroPageX, 4, false);
    t[0x8D] = op(Sta, Absolute, 4, false);
    t[0x9D] = op(Sta, AbsoluteX, 5, false);
    t[0x99] = op(Sta, AbsoluteY, 5, false);
    t[0x81] = op(Sta, IndirectX, 6, false);
    t[0x91] = op(Sta, IndirectY, 6, false);

    t[0x86] = op(Stx, ZeroPage, 3, false);
    t[0x96] = op(Stx, ZeroPageY, 4, false);
    t[0x8E] = op(Stx, Absolute, 4, false);

    t[0x84] = op(Sty, ZeroPage, 3, false);
    t[0x94] = op(Sty, ZeroPageX, 4, false);
    t[0x8C] = op(Sty, Absolute, 4, false);

    t[0xAA] = op(Tax, Implied, 2, false);
    t[0xA8] = op(Tay, Implied, 2, false);
    t[0xBA] = op(Tsx, Implied, 2, false);
    t[0x8A] = op(Txa, Implied, 2, false);
    t[0x9A] = op(Txs, Implied, 2, false);
    t[0x98] = op(Tya, Implied, 2, false);

    t
}

static OPCODES: [OpcodeDesc; 256] = build_opcode_table();

/// MOS 6502 CPU state and execution engine.
#[derive(Debug)]
pub struct Cpu6502<M: Memory6502> {
    /// Accumulator register
    pub a: u8,
    /// X index register
    pub x: u8,
    /// Y index register
    pub y: u8,
    /// Stack pointer (points to 0x0100 + sp)
    pub sp: u8,
    /// Status register (NV-BDIZC)
    pub status: u8,
    /// Program counter
    pub pc: u16,
    /// Cycles left in the current instruction's window
    pub cycles_remaining: u8,
    /// Reset vector as read from $FFFC/$FFFD
    pub reset_vector: u16,
    /// True when the reset vector was $0000 and PC was patched to $F000
    pub reset_vector_was_patched: bool,
    /// Total cycles clocked
    pub total_cycles: u64,
    /// Instructions executed
    pub instructions: u64,
    /// Undocumented opcodes encountered (executed as NOP)
    pub unknown_opcodes: u64,
    /// Memory interface
    pub memory: M,
}

impl<M: Memory6502> Cpu6502<M> {
    /// Create a new 6502 CPU with the given memory interface.
    /// Call `reset()` before clocking.
    pub fn new(memory: M) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: FLAG_U | FLAG_I,
            pc: 0,
            cycles_remaining: 0,
            reset_vector: 0,
            reset_vector_was_patched: false,
            total_cycles: 0,
            instructions: 0,
            unknown_opcodes: 0,
            memory,
        }
    }

    /// Reset the CPU to power-on state (preserves memory).
    ///
    /// Loads PC from the vector at $FFFC/$FFFD. An all-zero vector is
    /// patched to $F000 so that images with a blank vector table still boot.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.status = FLAG_U | FLAG_I;

        self.reset_vector = self.read_u16(0xFFFC);
        if self.reset_vector == 0 {
            self.pc = PATCHED_RESET_PC;
            self.reset_vector_was_patched = true;
            log(LogCategory::Cpu, LogLevel::Warn, || {
                format!("zero reset vector, patching PC to {:04X}", PATCHED_RESET_PC)
            });
        } else {
            self.pc = self.reset_vector;
            self.reset_vector_was_patched = false;
        }

        // The hardware spends 7 cycles on the reset sequence.
        self.cycles_remaining = 7;
    }

    /// Advance one CPU cycle.
    ///
    /// An instruction executes in full on the first cycle of its window;
    /// the remaining cycles only burn down `cycles_remaining`.
    pub fn clock(&mut self) {
        if self.cycles_remaining == 0 {
            self.cycles_remaining = self.execute_instruction();
        }
        self.cycles_remaining -= 1;
        self.total_cycles += 1;
    }

    /// Execute one whole instruction immediately and return its cycle count.
    ///
    /// Bypasses the per-cycle pacing; used by tests and benchmarks.
    pub fn step(&mut self) -> u32 {
        self.cycles_remaining = 0;
        let used = self.execute_instruction();
        self.total_cycles += used as u64;
        used as u32
    }

    /// Trigger a maskable interrupt. Ignored while the I flag is set.
    pub fn irq(&mut self) {
        if self.status & FLAG_I != 0 {
            return;
        }
        self.interrupt(0xFFFE);
    }

    /// Trigger a non-maskable interrupt.
    pub fn nmi(&mut self) {
        self.interrupt(0xFFFA);
    }

    fn interrupt(&mut self, vector: u16) {
        self.push_u16(self.pc);
        // Interrupts push with B clear; only PHP/BRK set it.
        self.push_u8((self.status & !FLAG_B) | FLAG_U);
        self.status |= FLAG_I;
        self.pc = self.read_u16(vector);
        self.cycles_remaining = 7;
    }

    #[inline]
    fn read(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u16, val: u8) {
        self.memory.write(addr, val);
    }

    fn read_u16(&self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let v = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    /// Read a 16-bit pointer for JMP (indirect) with the 6502 page-wrapping
    /// bug: the high byte comes from `(ptr & $FF00) | ((ptr+1) & $FF)`.
    #[inline]
    fn read_indirect_u16_bug(&self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = self.read(hi_addr) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn push_u8(&mut self, v: u8) {
        let addr = 0x0100u16 | self.sp as u16;
        self.write(addr, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    fn pop_u8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read(0x0100u16 | self.sp as u16)
    }

    #[inline]
    fn push_u16(&mut self, v: u16) {
        self.push_u8((v >> 8) as u8);
        self.push_u8(v as u8);
    }

    #[inline]
    fn pop_u16(&mut self) -> u16 {
        let lo = self.pop_u8() as u16;
        let hi = self.pop_u8() as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    #[inline]
    fn set_zn(&mut self, v: u8) {
        self.set_flag(FLAG_Z, v == 0);
        self.set_flag(FLAG_N, v & 0x80 != 0);
    }

    /// Fetch, decode and execute one instruction; returns cycles used.
    fn execute_instruction(&mut self) -> u8 {
        let opcode = self.fetch_u8();
        let desc = OPCODES[opcode as usize];

        if desc.mnemonic == Mnemonic::Unknown {
            self.unknown_opcodes += 1;
            let pc = self.pc.wrapping_sub(1);
            log(LogCategory::Cpu, LogLevel::Debug, || {
                format!("unknown opcode {:02X} at PC={:04X}", opcode, pc)
            });
        }

        let used = execute(self, desc);
        self.instructions += 1;
        // Bit 5 has no storage on the die; it always reads back as 1.
        self.status |= FLAG_U;
        used
    }
}

impl<M: Memory6502> crate::Cpu for Cpu6502<M> {
    fn reset(&mut self) {
        Cpu6502::reset(self);
    }

    fn clock(&mut self) {
        Cpu6502::clock(self);
    }
}

/// Resolve an addressing mode to an effective address.
/// Returns the address and whether indexing crossed a page boundary.
fn operand_addr<M: Memory6502>(cpu: &mut Cpu6502<M>, mode: Mode) -> (u16, bool) {
    match mode {
        Mode::Immediate => {
            let addr = cpu.pc;
            cpu.pc = cpu.pc.wrapping_add(1);
            (addr, false)
        }
        Mode::ZeroPage => (cpu.fetch_u8() as u16, false),
        Mode::ZeroPageX => (cpu.fetch_u8().wrapping_add(cpu.x) as u16, false),
        Mode::ZeroPageY => (cpu.fetch_u8().wrapping_add(cpu.y) as u16, false),
        Mode::Absolute => (cpu.fetch_u16(), false),
        Mode::AbsoluteX => {
            let base = cpu.fetch_u16();
            let addr = base.wrapping_add(cpu.x as u16);
            (addr, (base ^ addr) & 0xFF00 != 0)
        }
        Mode::AbsoluteY => {
            let base = cpu.fetch_u16();
            let addr = base.wrapping_add(cpu.y as u16);
            (addr, (base ^ addr) & 0xFF00 != 0)
        }
        Mode::IndirectX => {
            let zp = cpu.fetch_u8().wrapping_add(cpu.x);
            let lo = cpu.read(zp as u16) as u16;
            let hi = cpu.read(zp.wrapping_add(1) as u16) as u16;
            ((hi << 8) | lo, false)
        }
        Mode::IndirectY => {
            let zp = cpu.fetch_u8();
            let lo = cpu.read(zp as u16) as u16;
            let hi = cpu.read(zp.wrapping_add(1) as u16) as u16;
            let base = (hi << 8) | lo;
            let addr = base.wrapping_add(cpu.y as u16);
            (addr, (base ^ addr) & 0xFF00 != 0)
        }
        Mode::Indirect => {
            let ptr = cpu.fetch_u16();
            (cpu.read_indirect_u16_bug(ptr), false)
        }
        // Implied/Accumulator have no operand; Relative is fetched by the
        // branch handler so it can do its own cycle accounting.
        Mode::Implied | Mode::Accumulator | Mode::Relative => (0, false),
    }
}

/// Fetch the operand value for a read-style instruction.
fn fetch_operand<M: Memory6502>(cpu: &mut Cpu6502<M>, desc: OpcodeDesc) -> (u8, u8) {
    let (addr, crossed) = operand_addr(cpu, desc.mode);
    let penalty = if crossed && desc.page_penalty { 1 } else { 0 };
    (cpu.read(addr), penalty)
}

fn do_adc<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) {
    let carry_in = (cpu.status & FLAG_C) as u16;
    let binary = cpu.a as u16 + v as u16 + carry_in;
    // V comes from the binary sum even in decimal mode (NMOS behavior).
    let overflow = (!(cpu.a ^ v) & (cpu.a ^ binary as u8) & 0x80) != 0;

    if cpu.status & FLAG_D != 0 {
        let mut lo = (cpu.a & 0x0F) as u16 + (v & 0x0F) as u16 + carry_in;
        let mut hi = (cpu.a >> 4) as u16 + (v >> 4) as u16;
        if lo > 9 {
            lo += 6;
            hi += 1;
        }
        if hi > 9 {
            hi += 6;
        }
        let result = (((hi & 0x0F) << 4) | (lo & 0x0F)) as u8;
        cpu.set_flag(FLAG_C, hi > 0x0F);
        cpu.set_flag(FLAG_V, overflow);
        cpu.a = result;
        cpu.set_zn(result);
    } else {
        let result = binary as u8;
        cpu.set_flag(FLAG_C, binary > 0xFF);
        cpu.set_flag(FLAG_V, overflow);
        cpu.a = result;
        cpu.set_zn(result);
    }
}

/// SBC is ADC of the one's complement; the carry supplies the borrow.
fn do_sbc<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) {
    do_adc(cpu, v ^ 0xFF);
}

fn do_compare<M: Memory6502>(cpu: &mut Cpu6502<M>, reg: u8, v: u8) {
    cpu.set_flag(FLAG_C, reg >= v);
    let result = reg.wrapping_sub(v);
    cpu.set_zn(result);
}

fn do_bit<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) {
    cpu.set_flag(FLAG_Z, cpu.a & v == 0);
    cpu.set_flag(FLAG_V, v & 0x40 != 0);
    cpu.set_flag(FLAG_N, v & 0x80 != 0);
}

fn do_asl<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) -> u8 {
    cpu.set_flag(FLAG_C, v & 0x80 != 0);
    let result = v << 1;
    cpu.set_zn(result);
    result
}

fn do_lsr<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) -> u8 {
    cpu.set_flag(FLAG_C, v & 0x01 != 0);
    let result = v >> 1;
    cpu.set_zn(result);
    result
}

fn do_rol<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) -> u8 {
    let carry_in = cpu.status & FLAG_C;
    cpu.set_flag(FLAG_C, v & 0x80 != 0);
    let result = (v << 1) | carry_in;
    cpu.set_zn(result);
    result
}

fn do_ror<M: Memory6502>(cpu: &mut Cpu6502<M>, v: u8) -> u8 {
    let carry_in = if cpu.status & FLAG_C != 0 { 0x80 } else { 0 };
    cpu.set_flag(FLAG_C, v & 0x01 != 0);
    let result = (v >> 1) | carry_in;
    cpu.set_zn(result);
    result
}

/// Apply a shift/rotate either to the accumulator or read-modify-write.
fn do_rmw<M: Memory6502>(
    cpu: &mut Cpu6502<M>,
    desc: OpcodeDesc,
    f: fn(&mut Cpu6502<M>, u8) -> u8,
) {
    if desc.mode == Mode::Accumulator {
        let a = cpu.a;
        let result = f(cpu, a);
        cpu.a = result;
    } else {
        let (addr, _) = operand_addr(cpu, desc.mode);
        let v = cpu.read(addr);
        let result = f(cpu, v);
        cpu.write(addr, result);
    }
}

/// Take a conditional branch. Returns extra cycles: +1 taken, +1 more when
/// the target lands on a different page.
fn do_branch<M: Memory6502>(cpu: &mut Cpu6502<M>, cond: bool) -> u8 {
    let offset = cpu.fetch_u8() as i8;
    if !cond {
        return 0;
    }
    let old = cpu.pc;
    cpu.pc = old.wrapping_add(offset as i16 as u16);
    if (old ^ cpu.pc) & 0xFF00 != 0 {
        2
    } else {
        1
    }
}

/// Execute the instruction described by `desc`; returns total cycles used.
fn execute<M: Memory6502>(cpu: &mut Cpu6502<M>, desc: OpcodeDesc) -> u8 {
    use Mnemonic::*;

    let mut extra = 0u8;
    match desc.mnemonic {
        Lda => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.a = v;
            cpu.set_zn(v);
            extra = p;
        }
        Ldx => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.x = v;
            cpu.set_zn(v);
            extra = p;
        }
        Ldy => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.y = v;
            cpu.set_zn(v);
            extra = p;
        }
        Sta => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            cpu.write(addr, cpu.a);
        }
        Stx => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            cpu.write(addr, cpu.x);
        }
        Sty => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            cpu.write(addr, cpu.y);
        }
        Adc => {
            let (v, p) = fetch_operand(cpu, desc);
            do_adc(cpu, v);
            extra = p;
        }
        Sbc => {
            let (v, p) = fetch_operand(cpu, desc);
            do_sbc(cpu, v);
            extra = p;
        }
        And => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.a &= v;
            let a = cpu.a;
            cpu.set_zn(a);
            extra = p;
        }
        Ora => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.a |= v;
            let a = cpu.a;
            cpu.set_zn(a);
            extra = p;
        }
        Eor => {
            let (v, p) = fetch_operand(cpu, desc);
            cpu.a ^= v;
            let a = cpu.a;
            cpu.set_zn(a);
            extra = p;
        }
        Cmp => {
            let (v, p) = fetch_operand(cpu, desc);
            let a = cpu.a;
            do_compare(cpu, a, v);
            extra = p;
        }
        Cpx => {
            let (v, _) = fetch_operand(cpu, desc);
            let x = cpu.x;
            do_compare(cpu, x, v);
        }
        Cpy => {
            let (v, _) = fetch_operand(cpu, desc);
            let y = cpu.y;
            do_compare(cpu, y, v);
        }
        Bit => {
            let (v, _) = fetch_operand(cpu, desc);
            do_bit(cpu, v);
        }
        Asl => do_rmw(cpu, desc, do_asl),
        Lsr => do_rmw(cpu, desc, do_lsr),
        Rol => do_rmw(cpu, desc, do_rol),
        Ror => do_rmw(cpu, desc, do_ror),
        Inc => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            let v = cpu.read(addr).wrapping_add(1);
            cpu.write(addr, v);
            cpu.set_zn(v);
        }
        Dec => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            let v = cpu.read(addr).wrapping_sub(1);
            cpu.write(addr, v);
            cpu.set_zn(v);
        }
        Inx => {
            cpu.x = cpu.x.wrapping_add(1);
            let x = cpu.x;
            cpu.set_zn(x);
        }
        Iny => {
            cpu.y = cpu.y.wrapping_add(1);
            let y = cpu.y;
            cpu.set_zn(y);
        }
        Dex => {
            cpu.x = cpu.x.wrapping_sub(1);
            let x = cpu.x;
            cpu.set_zn(x);
        }
        Dey => {
            cpu.y = cpu.y.wrapping_sub(1);
            let y = cpu.y;
            cpu.set_zn(y);
        }
        Tax => {
            cpu.x = cpu.a;
            let x = cpu.x;
            cpu.set_zn(x);
        }
        Tay => {
            cpu.y = cpu.a;
            let y = cpu.y;
            cpu.set_zn(y);
        }
        Txa => {
            cpu.a = cpu.x;
            let a = cpu.a;
            cpu.set_zn(a);
        }
        Tya => {
            cpu.a = cpu.y;
            let a = cpu.a;
            cpu.set_zn(a);
        }
        Tsx => {
            cpu.x = cpu.sp;
            let x = cpu.x;
            cpu.set_zn(x);
        }
        Txs => {
            // TXS does not touch flags.
            cpu.sp = cpu.x;
        }
        Pha => {
            let a = cpu.a;
            cpu.push_u8(a);
        }
        Php => {
            // PHP pushes with B and bit 5 set.
            let s = cpu.status | FLAG_B | FLAG_U;
            cpu.push_u8(s);
        }
        Pla => {
            let v = cpu.pop_u8();
            cpu.a = v;
            cpu.set_zn(v);
        }
        Plp => {
            // B has no storage; bit 5 always reads 1.
            cpu.status = (cpu.pop_u8() | FLAG_U) & !FLAG_B;
        }
        Jmp => {
            let (addr, _) = operand_addr(cpu, desc.mode);
            cpu.pc = addr;
        }
        Jsr => {
            let addr = cpu.fetch_u16();
            let ret = cpu.pc.wrapping_sub(1);
            cpu.push_u16(ret);
            cpu.pc = addr;
        }
        Rts => {
            let ret = cpu.pop_u16();
            cpu.pc = ret.wrapping_add(1);
        }
        Rti => {
            cpu.status = (cpu.pop_u8() | FLAG_U) & !FLAG_B;
            cpu.pc = cpu.pop_u16();
        }
        Brk => {
            // BRK skips a signature byte; the pushed PC is already past it.
            let pc_to_push = cpu.pc.wrapping_add(1);
            cpu.push_u16(pc_to_push);
            let s = cpu.status | FLAG_B | FLAG_U;
            cpu.push_u8(s);
            cpu.status |= FLAG_I;
            cpu.pc = cpu.read_u16(0xFFFE);
        }
        Bcc | Bcs | Beq | Bne | Bmi | Bpl | Bvs | Bvc => {
            let cond = match desc.mnemonic {
                Bcc => cpu.status & FLAG_C == 0,
                Bcs => cpu.status & FLAG_C != 0,
                Beq => cpu.status & FLAG_Z != 0,
                Bne => cpu.status & FLAG_Z == 0,
                Bmi => cpu.status & FLAG_N != 0,
                Bpl => cpu.status & FLAG_N == 0,
                Bvs => cpu.status & FLAG_V != 0,
                _ => cpu.status & FLAG_V == 0,
            };
            extra = do_branch(cpu, cond);
        }
        Clc => cpu.set_flag(FLAG_C, false),
        Sec => cpu.set_flag(FLAG_C, true),
        Cli => cpu.set_flag(FLAG_I, false),
        Sei => cpu.set_flag(FLAG_I, true),
        Cld => cpu.set_flag(FLAG_D, false),
        Sed => cpu.set_flag(FLAG_D, true),
        Clv => cpu.set_flag(FLAG_V, false),
        Nop | Unknown => {}
    }

    desc.cycles + extra
}

/// Simple array-based memory implementation for testing.
#[derive(Debug)]
pub struct ArrayMemory {
    pub data: [u8; 0x10000],
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self { data: [0; 0x10000] }
    }

    /// Load a program into memory and point the reset vector at it.
    pub fn load_program(&mut self, offset: u16, data: &[u8]) {
        let off = offset as usize;
        self.data[off..off + data.len()].copy_from_slice(data);
        self.data[0xFFFC] = offset as u8;
        self.data[0xFFFD] = (offset >> 8) as u8;
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory6502 for ArrayMemory {
    fn read(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize] = val;
    }
}
