// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Current program status register. The low five bits hold the mode and
    /// are kept as unnamed bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cpsr: u32 {
        const T = 1 << 5;
        const F = 1 << 6;
        const I = 1 << 7;
        const Q = 1 << 27;
        const V = 1 << 28;
        const C = 1 << 29;
        const Z = 1 << 30;
        const N = 1 << 31;
    }
}

pub const MODE_MASK: u32 = 0x1F;

/// Initial supervisor stack pointer, near the top of cartridge RAM.
pub const RESET_SP: u32 = 0x4000_1FB4;
/// Initial supervisor link register.
pub const RESET_LR: u32 = 0x0000_0C00;
/// Entry point 0xC09 plus the two-byte pipeline offset. Bit 0 is the Thumb bit.
pub const RESET_PC: u32 = 0x0000_0C0B;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum Mode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1B,
    System = 0x1F,
}

impl Mode {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & MODE_MASK {
            0x10 => Some(Mode::User),
            0x11 => Some(Mode::Fiq),
            0x12 => Some(Mode::Irq),
            0x13 => Some(Mode::Supervisor),
            0x17 => Some(Mode::Abort),
            0x1B => Some(Mode::Undefined),
            0x1F => Some(Mode::System),
            _ => None,
        }
    }
}

/// Which storage a register index resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Shared,
    Supervisor,
}

/// Value returned by register reads in modes without a register bank.
pub const UNBANKED_READ: u32 = 0;

#[derive(Debug, Clone)]
pub struct RegisterFile {
    shared: [u32; 16],
    /// r13_svc, r14_svc
    supervisor: [u32; 2],
    cpsr: Cpsr,
}

impl Default for RegisterFile {
    fn default() -> Self {
        let mut regs = Self {
            shared: [0; 16],
            supervisor: [0; 2],
            cpsr: Cpsr::empty(),
        };
        regs.reset();
        regs
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.shared = [0; 16];
        self.supervisor = [RESET_SP, RESET_LR];
        self.shared[15] = RESET_PC;
        self.cpsr = Cpsr::T | Cpsr::I | Cpsr::F;
        self.set_mode_bits(Mode::Supervisor as u32);
    }

    pub fn cpsr(&self) -> Cpsr {
        self.cpsr
    }

    pub fn set_cpsr(&mut self, cpsr: Cpsr) {
        self.cpsr = cpsr;
    }

    pub fn mode(&self) -> Option<Mode> {
        Mode::from_bits(self.cpsr.bits())
    }

    /// Replace the 5-bit mode field, keeping every other CPSR bit.
    pub fn set_mode_bits(&mut self, bits: u32) {
        let raw = (self.cpsr.bits() & !MODE_MASK) | (bits & MODE_MASK);
        self.cpsr = Cpsr::from_bits_retain(raw);
    }

    /// Resolve a register index in the current mode.
    ///
    /// Only supervisor mode has a register bank; every other mode yields
    /// `None` and register access becomes a no-op.
    pub fn bank_for(&self, reg: u8) -> Option<Bank> {
        match self.mode() {
            Some(Mode::Supervisor) => match reg & 0xF {
                13 | 14 => Some(Bank::Supervisor),
                _ => Some(Bank::Shared),
            },
            Some(_) | None => None,
        }
    }

    pub fn read_register(&self, reg: u8) -> u32 {
        let reg = reg & 0xF;
        match self.bank_for(reg) {
            Some(Bank::Shared) => self.shared[reg as usize],
            Some(Bank::Supervisor) => self.supervisor[reg as usize - 13],
            None => UNBANKED_READ,
        }
    }

    /// Store a register. Returns the stored value, or 0 when the current mode
    /// has no register bank and nothing was written.
    pub fn write_register(&mut self, reg: u8, value: u32) -> u32 {
        let reg = reg & 0xF;
        match self.bank_for(reg) {
            Some(Bank::Shared) => self.shared[reg as usize] = value,
            Some(Bank::Supervisor) => self.supervisor[reg as usize - 13] = value,
            None => return UNBANKED_READ,
        }
        value
    }

    /// Shared-bank registers r0..r15 regardless of mode.
    pub fn shared_bank(&self) -> &[u32; 16] {
        &self.shared
    }

    /// Supervisor r13/r14 regardless of mode.
    pub fn supervisor_bank(&self) -> &[u32; 2] {
        &self.supervisor
    }

    pub fn flag(&self, flag: Cpsr) -> bool {
        self.cpsr.contains(flag)
    }

    pub fn do_nflag(&mut self, x: u32) {
        self.cpsr.set(Cpsr::N, x & 0x8000_0000 != 0);
    }

    pub fn do_zflag(&mut self, x: u32) {
        self.cpsr.set(Cpsr::Z, x == 0);
    }

    /// Carry out of the 33-bit sum `a + b + carry_in`.
    ///
    /// The low 31 bits are summed with the carry first; bit 31 of that partial
    /// sum plus both sign bits then gives the carry in bit 1.
    pub fn do_cflag(&mut self, a: u32, b: u32, carry_in: u32) {
        let partial = (a & 0x7FFF_FFFF) + (b & 0x7FFF_FFFF) + (carry_in & 1);
        let top = (partial >> 31) + (a >> 31) + (b >> 31);
        self.cpsr.set(Cpsr::C, top & 2 != 0);
    }

    pub fn do_add_vflag(&mut self, a: u32, b: u32, result: u32) {
        let same_sign = (a ^ b) & 0x8000_0000 == 0;
        let flipped = (b ^ result) & 0x8000_0000 != 0;
        self.cpsr.set(Cpsr::V, same_sign && flipped);
    }

    pub fn do_sub_vflag(&mut self, a: u32, b: u32, result: u32) {
        let differ = (a ^ b) & 0x8000_0000 != 0;
        let matches_b = (b ^ result) & 0x8000_0000 == 0;
        self.cpsr.set(Cpsr::V, differ && matches_b);
    }

    pub fn do_cflag_bit(&mut self, set: bool) {
        self.cpsr.set(Cpsr::C, set);
    }

    pub fn do_vflag_bit(&mut self, set: bool) {
        self.cpsr.set(Cpsr::V, set);
    }

    pub fn condition_passed(&self, cond: u8) -> bool {
        let n = self.flag(Cpsr::N);
        let z = self.flag(Cpsr::Z);
        let c = self.flag(Cpsr::C);
        let v = self.flag(Cpsr::V);

        match cond {
            0x0 => z,              // EQ
            0x1 => !z,             // NE
            0x2 => c,              // CS/HS
            0x3 => !c,             // CC/LO
            0x4 => n,              // MI
            0x5 => !n,             // PL
            0x6 => v,              // VS
            0x7 => !v,             // VC
            0x8 => c && !z,        // HI
            0x9 => !c || z,        // LS
            0xA => n == v,         // GE
            0xB => n != v,         // LT
            0xC => !z && (n == v), // GT
            0xD => z || (n != v),  // LE
            _ => false,            // undefined / SWI space
        }
    }
}
