// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::registers::{Cpsr, RegisterFile};
use super::Step;
use crate::bus::AddressBus;
use crate::config::ThumbConfig;
use crate::decoder::thumb::{decode_thumb_16, lookup, Instruction};
use crate::metrics::ExecutionMetrics;
use crate::snapshot::ThumbSnapshot;
use crate::{StopReason, ThumbError, ThumbResult, MAX_INSTRUCTIONS};

/// Thumb interpreter over a borrowed ROM image and RAM buffer.
///
/// Register 15 runs two bytes ahead of the next fetch and carries the Thumb
/// bit in bit 0; the bus drops that bit when indexing half-words.
pub struct Thumbulator<'a> {
    regs: RegisterFile,
    bus: AddressBus<'a>,
    config: ThumbConfig,
    pending_branch_link: Option<u16>,
    instructions: u64,
}

impl<'a> Thumbulator<'a> {
    pub fn new(rom: &'a [u16], ram: &'a mut [u16]) -> Self {
        Self::with_config(rom, ram, ThumbConfig::default())
    }

    pub fn with_config(rom: &'a [u16], ram: &'a mut [u16], config: ThumbConfig) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::new(),
            bus: AddressBus::new(rom, ram),
            config,
            pending_branch_link: None,
            instructions: 0,
        };
        cpu.reset();
        cpu
    }

    pub fn config(&self) -> &ThumbConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.regs.reset();
        self.bus.reset();
        self.pending_branch_link = None;
        self.instructions = 0;
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn bus(&self) -> &AddressBus<'a> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut AddressBus<'a> {
        &mut self.bus
    }

    /// First half of a BL waiting for its second half.
    pub fn pending_branch_link(&self) -> Option<u16> {
        self.pending_branch_link
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        ExecutionMetrics::new(self.instructions, self.bus.counters())
    }

    pub fn snapshot(&self) -> ThumbSnapshot {
        let shared = self.regs.shared_bank();
        let supervisor = self.regs.supervisor_bank();
        ThumbSnapshot {
            registers: shared.to_vec(),
            sp_svc: supervisor[0],
            lr_svc: supervisor[1],
            pc: shared[15],
            cpsr: self.regs.cpsr().bits(),
            mamcr: self.bus.mamcr(),
            pending_branch_link: self.pending_branch_link,
            metrics: self.metrics(),
        }
    }

    /// Reset, then execute until the program stops or `MAX_INSTRUCTIONS`
    /// instructions have run.
    pub fn run(&mut self) -> ThumbResult<StopReason> {
        self.reset();

        let reason = loop {
            if self.instructions >= MAX_INSTRUCTIONS {
                break StopReason::MaxInstructionsReached;
            }
            if let Step::Stop(reason) = self.step() {
                break reason;
            }
        };

        let metrics = self.metrics();
        if reason.is_fatal() {
            tracing::warn!("Thumbulator stopped: {} ({})", reason, metrics);
            if self.config.trap_on_fatal {
                return Err(ThumbError::Fatal {
                    reason,
                    snapshot: Box::new(self.snapshot()),
                });
            }
        } else {
            tracing::debug!("Thumbulator stopped: {} ({})", reason, metrics);
        }

        Ok(reason)
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self) -> Step {
        let pc = self.read_reg(15);
        let opcode = self.bus.fetch16(pc.wrapping_sub(2));
        let pc = pc.wrapping_add(2);
        self.write_reg(15, pc);
        self.instructions += 1;

        if self.config.trace_instructions {
            let mnemonic = lookup(opcode).map_or("UNDEFINED", |p| p.mnemonic);
            tracing::trace!(
                "{:#010x}: {:04x}  {}",
                pc.wrapping_sub(4) & !1,
                opcode,
                mnemonic
            );
        }

        self.execute(decode_thumb_16(opcode), pc)
    }

    fn read_reg(&self, n: u8) -> u32 {
        self.regs.read_register(n)
    }

    fn write_reg(&mut self, n: u8, value: u32) {
        self.regs.write_register(n, value);
    }

    fn carry(&self) -> u32 {
        u32::from(self.regs.flag(Cpsr::C))
    }

    fn update_nz(&mut self, result: u32) {
        self.regs.do_nflag(result);
        self.regs.do_zflag(result);
    }

    fn update_add_flags(&mut self, a: u32, b: u32, result: u32, carry_in: u32) {
        self.update_nz(result);
        self.regs.do_cflag(a, b, carry_in);
        self.regs.do_add_vflag(a, b, result);
    }

    fn update_sub_flags(&mut self, a: u32, b: u32, result: u32) {
        self.update_nz(result);
        self.regs.do_cflag(a, !b, 1);
        self.regs.do_sub_vflag(a, b, result);
    }

    fn apply_shift(&mut self, rd: u8, (result, carry): (u32, Option<bool>)) {
        if let Some(carry) = carry {
            self.regs.do_cflag_bit(carry);
        }
        self.write_reg(rd, result);
        self.update_nz(result);
    }

    fn load_byte(&mut self, addr: u32) -> u32 {
        let word = self.bus.read16(addr & !1);
        let byte = if addr & 1 != 0 { word >> 8 } else { word };
        byte & 0xFF
    }

    fn store_byte(&mut self, addr: u32, value: u32) {
        let word = self.bus.read16(addr & !1);
        let merged = if addr & 1 != 0 {
            (word & 0x00FF) | (value << 8)
        } else {
            (word & 0xFF00) | (value & 0x00FF)
        };
        self.bus.write16(addr & !1, merged & 0xFFFF);
    }

    /// BX / BLX(2). An even target would leave Thumb state, which ends the run.
    fn branch_exchange(&mut self, rm: u8, link: Option<u32>) -> Step {
        let target = self.read_reg(rm).wrapping_add(2);
        if target & 1 == 0 {
            return Step::Stop(StopReason::ExchangeToArm {
                target: Some(target),
            });
        }
        if let Some(lr) = link {
            self.write_reg(14, lr);
        }
        self.write_reg(15, target);
        Step::Continue
    }

    fn execute(&mut self, instruction: Instruction, pc: u32) -> Step {
        match instruction {
            Instruction::Adc { rd, rm } => {
                let a = self.read_reg(rd);
                let b = self.read_reg(rm);
                let c = self.carry();
                let result = a.wrapping_add(b).wrapping_add(c);
                self.write_reg(rd, result);
                self.update_add_flags(a, b, result, c);
            }
            Instruction::AddImm3 { rd, rn, imm } => {
                let a = self.read_reg(rn);
                let result = a.wrapping_add(imm);
                self.write_reg(rd, result);
                self.update_add_flags(a, imm, result, 0);
            }
            Instruction::AddImm8 { rd, imm } => {
                let a = self.read_reg(rd);
                let result = a.wrapping_add(imm);
                self.write_reg(rd, result);
                self.update_nz(result);
                self.regs.do_cflag(a, imm, 0);
                // Overflow is taken against the negated immediate.
                self.regs.do_add_vflag(a, imm.wrapping_neg(), result);
            }
            Instruction::AddReg { rd, rn, rm } => {
                let a = self.read_reg(rn);
                let b = self.read_reg(rm);
                let result = a.wrapping_add(b);
                self.write_reg(rd, result);
                self.update_add_flags(a, b, result, 0);
            }
            Instruction::AddHigh { rd, rm } => {
                let result = self.read_reg(rd).wrapping_add(self.read_reg(rm));
                self.write_reg(rd, result);
            }
            Instruction::AddPc { rd, imm } => {
                self.write_reg(rd, (pc & !3).wrapping_add(imm));
            }
            Instruction::AddSp { rd, imm } => {
                let result = self.read_reg(13).wrapping_add(imm);
                self.write_reg(rd, result);
            }
            Instruction::AddSpImm { imm } => {
                let result = self.read_reg(13).wrapping_add(imm);
                self.write_reg(13, result);
            }
            Instruction::Sbc { rd, rm } => {
                let a = self.read_reg(rd);
                let b = self.read_reg(rm);
                let borrow = 1 - self.carry();
                let result = a.wrapping_sub(b).wrapping_sub(borrow);
                self.write_reg(rd, result);
                self.update_nz(result);
                // Carry is the plain a + b carry, not the borrow.
                self.regs.do_cflag(a, b, 0);
                self.regs.do_sub_vflag(a, b, result);
            }
            Instruction::SubImm3 { rd, rn, imm } => {
                let a = self.read_reg(rn);
                let result = a.wrapping_sub(imm);
                self.write_reg(rd, result);
                self.update_sub_flags(a, imm, result);
            }
            Instruction::SubImm8 { rd, imm } => {
                let a = self.read_reg(rd);
                let result = a.wrapping_sub(imm);
                self.write_reg(rd, result);
                self.update_sub_flags(a, imm, result);
            }
            Instruction::SubReg { rd, rn, rm } => {
                let a = self.read_reg(rn);
                let b = self.read_reg(rm);
                let result = a.wrapping_sub(b);
                self.write_reg(rd, result);
                self.update_sub_flags(a, b, result);
            }
            Instruction::SubSpImm { imm } => {
                let result = self.read_reg(13).wrapping_sub(imm);
                self.write_reg(13, result);
            }
            Instruction::Neg { rd, rm } => {
                let b = self.read_reg(rm);
                let result = 0u32.wrapping_sub(b);
                self.write_reg(rd, result);
                self.update_sub_flags(0, b, result);
            }
            Instruction::Mul { rd, rm } => {
                let result = self.read_reg(rd).wrapping_mul(self.read_reg(rm));
                self.write_reg(rd, result);
                self.update_nz(result);
            }

            Instruction::Cmn { rn, rm } => {
                let a = self.read_reg(rn);
                let b = self.read_reg(rm);
                self.update_add_flags(a, b, a.wrapping_add(b), 0);
            }
            Instruction::CmpImm { rn, imm } => {
                let a = self.read_reg(rn);
                self.update_sub_flags(a, imm, a.wrapping_sub(imm));
            }
            Instruction::CmpReg { rn, rm } | Instruction::CmpHigh { rn, rm } => {
                let a = self.read_reg(rn);
                let b = self.read_reg(rm);
                self.update_sub_flags(a, b, a.wrapping_sub(b));
            }

            Instruction::And { rd, rm } => {
                let result = self.read_reg(rd) & self.read_reg(rm);
                self.write_reg(rd, result);
                self.update_nz(result);
            }
            Instruction::Orr { rd, rm } => {
                let result = self.read_reg(rd) | self.read_reg(rm);
                self.write_reg(rd, result);
                self.update_nz(result);
            }
            Instruction::Eor { rd, rm } => {
                let result = self.read_reg(rd) ^ self.read_reg(rm);
                self.write_reg(rd, result);
                self.update_nz(result);
            }
            Instruction::Bic { rd, rm } => {
                let result = self.read_reg(rd) & !self.read_reg(rm);
                self.write_reg(rd, result);
                self.update_nz(result);
            }
            Instruction::Mvn { rd, rm } => {
                let result = !self.read_reg(rm);
                self.write_reg(rd, result);
                self.update_nz(result);
            }
            Instruction::Tst { rn, rm } => {
                let result = self.read_reg(rn) & self.read_reg(rm);
                self.update_nz(result);
            }

            Instruction::LslImm { rd, rm, imm } => {
                let shifted = lsl_imm(self.read_reg(rm), u32::from(imm));
                self.apply_shift(rd, shifted);
            }
            Instruction::LsrImm { rd, rm, imm } => {
                let shifted = lsr_imm(self.read_reg(rm), u32::from(imm));
                self.apply_shift(rd, shifted);
            }
            Instruction::AsrImm { rd, rm, imm } => {
                let shifted = asr_imm(self.read_reg(rm), u32::from(imm));
                self.apply_shift(rd, shifted);
            }
            Instruction::LslReg { rd, rs } => {
                let shifted = lsl_reg(self.read_reg(rd), self.read_reg(rs) & 0xFF);
                self.apply_shift(rd, shifted);
            }
            Instruction::LsrReg { rd, rs } => {
                let shifted = lsr_reg(self.read_reg(rd), self.read_reg(rs) & 0xFF);
                self.apply_shift(rd, shifted);
            }
            Instruction::AsrReg { rd, rs } => {
                let shifted = asr_reg(self.read_reg(rd), self.read_reg(rs) & 0xFF);
                self.apply_shift(rd, shifted);
            }
            Instruction::Ror { rd, rs } => {
                let shifted = ror_reg(self.read_reg(rd), self.read_reg(rs) & 0xFF);
                self.apply_shift(rd, shifted);
            }

            Instruction::MovImm { rd, imm } => {
                self.write_reg(rd, imm);
                self.update_nz(imm);
            }
            Instruction::MovLow { rd, rn } => {
                let value = self.read_reg(rn);
                self.write_reg(rd, value);
                self.update_nz(value);
                self.regs.do_cflag_bit(false);
                self.regs.do_vflag_bit(false);
            }
            Instruction::MovHigh { rd, rm } | Instruction::Cpy { rd, rm } => {
                let mut value = self.read_reg(rm);
                if rd == 15 {
                    value = value.wrapping_add(2);
                }
                self.write_reg(rd, value);
            }

            Instruction::Sxtb { rd, rm } => {
                let value = self.read_reg(rm) as u8 as i8 as i32 as u32;
                self.write_reg(rd, value);
            }
            Instruction::Sxth { rd, rm } => {
                let value = self.read_reg(rm) as u16 as i16 as i32 as u32;
                self.write_reg(rd, value);
            }
            Instruction::Uxtb { rd, rm } => {
                let value = self.read_reg(rm) & 0xFF;
                self.write_reg(rd, value);
            }
            Instruction::Uxth { rd, rm } => {
                let value = self.read_reg(rm) & 0xFFFF;
                self.write_reg(rd, value);
            }
            Instruction::Rev { rd, rn } => {
                let value = self.read_reg(rn).swap_bytes();
                self.write_reg(rd, value);
            }
            Instruction::Rev16 { rd, rn } => {
                let v = self.read_reg(rn);
                self.write_reg(rd, ((v & 0x00FF_00FF) << 8) | ((v >> 8) & 0x00FF_00FF));
            }
            Instruction::Revsh { rd, rn } => {
                let value = (self.read_reg(rn) as u16).swap_bytes() as i16 as i32 as u32;
                self.write_reg(rd, value);
            }

            Instruction::LdrImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.bus.read32(addr);
                self.write_reg(rd, value);
            }
            Instruction::LdrReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.bus.read32(addr);
                self.write_reg(rd, value);
            }
            Instruction::LdrPc { rd, offset } => {
                let value = self.bus.read32((pc & !3).wrapping_add(offset));
                self.write_reg(rd, value);
            }
            Instruction::LdrSp { rd, offset } => {
                let addr = self.read_reg(13).wrapping_add(offset);
                let value = self.bus.read32(addr);
                self.write_reg(rd, value);
            }
            Instruction::LdrbImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.load_byte(addr);
                self.write_reg(rd, value);
            }
            Instruction::LdrbReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.load_byte(addr);
                self.write_reg(rd, value);
            }
            Instruction::LdrhImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.bus.read16(addr) & 0xFFFF;
                self.write_reg(rd, value);
            }
            Instruction::LdrhReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.bus.read16(addr) & 0xFFFF;
                self.write_reg(rd, value);
            }
            Instruction::Ldrsb { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.load_byte(addr) as u8 as i8 as i32 as u32;
                self.write_reg(rd, value);
            }
            Instruction::Ldrsh { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.bus.read16(addr) as u16 as i16 as i32 as u32;
                self.write_reg(rd, value);
            }
            Instruction::Ldmia { rn, registers } => {
                let mut addr = self.read_reg(rn);
                for i in 0..8u8 {
                    if registers & (1 << i) != 0 {
                        let value = self.bus.read32(addr);
                        self.write_reg(i, value);
                        addr = addr.wrapping_add(4);
                    }
                }
                self.write_reg(rn, addr);
            }
            Instruction::Pop { registers, pc: load_pc } => {
                let mut sp = self.read_reg(13);
                for i in 0..8u8 {
                    if registers & (1 << i) != 0 {
                        let value = self.bus.read32(sp);
                        self.write_reg(i, value);
                        sp = sp.wrapping_add(4);
                    }
                }
                if load_pc {
                    let target = self.bus.read32(sp).wrapping_add(2);
                    self.write_reg(15, target);
                    sp = sp.wrapping_add(4);
                }
                self.write_reg(13, sp);
            }

            Instruction::StrImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.read_reg(rd);
                self.bus.write32(addr, value);
            }
            Instruction::StrReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.read_reg(rd);
                self.bus.write32(addr, value);
            }
            Instruction::StrSp { rd, offset } => {
                let addr = self.read_reg(13).wrapping_add(offset);
                let value = self.read_reg(rd);
                self.bus.write32(addr, value);
            }
            Instruction::StrbImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.read_reg(rd);
                self.store_byte(addr, value);
            }
            Instruction::StrbReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.read_reg(rd);
                self.store_byte(addr, value);
            }
            Instruction::StrhImm { rd, rn, offset } => {
                let addr = self.read_reg(rn).wrapping_add(offset);
                let value = self.read_reg(rd) & 0xFFFF;
                self.bus.write16(addr, value);
            }
            Instruction::StrhReg { rd, rn, rm } => {
                let addr = self.read_reg(rn).wrapping_add(self.read_reg(rm));
                let value = self.read_reg(rd) & 0xFFFF;
                self.bus.write16(addr, value);
            }
            Instruction::Stmia { rn, registers } => {
                let mut addr = self.read_reg(rn);
                for i in 0..8u8 {
                    if registers & (1 << i) != 0 {
                        let value = self.read_reg(i);
                        self.bus.write32(addr, value);
                        addr = addr.wrapping_add(4);
                    }
                }
                self.write_reg(rn, addr);
            }
            Instruction::Push { registers, lr } => {
                let count = registers.count_ones() + u32::from(lr);
                let sp = self.read_reg(13).wrapping_sub(count * 4);
                let mut addr = sp;
                for i in 0..8u8 {
                    if registers & (1 << i) != 0 {
                        let value = self.read_reg(i);
                        self.bus.write32(addr, value);
                        addr = addr.wrapping_add(4);
                    }
                }
                if lr {
                    let value = self.read_reg(14);
                    self.bus.write32(addr, value);
                }
                self.write_reg(13, sp);
            }

            Instruction::BranchCond { cond, offset } => {
                if self.regs.condition_passed(cond) {
                    let target = pc.wrapping_add(2).wrapping_add(offset as u32);
                    self.write_reg(15, target);
                }
            }
            Instruction::Branch { offset } => {
                let target = pc.wrapping_add(2).wrapping_add(offset as u32);
                self.write_reg(15, target);
            }
            Instruction::BlPrefix { opcode } => {
                self.pending_branch_link = Some(opcode);
            }
            Instruction::BlSuffix { low } => {
                let high = match self.pending_branch_link.take() {
                    Some(high) => high,
                    None => {
                        tracing::warn!(
                            "BL second half at {:#010x} without a first half",
                            pc.wrapping_sub(4) & !1
                        );
                        0
                    }
                };
                let upper = (((u32::from(high) << 21) as i32) >> 21) as u32;
                let offset = ((upper << 11) | u32::from(low)) << 1;
                self.write_reg(14, pc.wrapping_sub(2));
                self.write_reg(15, offset.wrapping_add(pc));
            }
            Instruction::BlxSuffix => {
                return Step::Stop(StopReason::ExchangeToArm { target: None });
            }
            Instruction::Bx { rm } => return self.branch_exchange(rm, None),
            Instruction::BlxReg { rm } => {
                return self.branch_exchange(rm, Some(pc.wrapping_sub(2)));
            }

            Instruction::Bkpt { imm } => return Step::Stop(StopReason::Breakpoint { imm }),
            Instruction::Swi { imm } => return Step::Stop(StopReason::SoftwareInterrupt { imm }),
            Instruction::Cps => return Step::Stop(StopReason::ChangeProcessorState),
            Instruction::Setend => return Step::Stop(StopReason::SetEndianness),
            Instruction::Undefined(opcode) => {
                return Step::Stop(StopReason::UndefinedInstruction { opcode });
            }
        }

        Step::Continue
    }
}

// Shift helpers return the result and the new carry, if the carry changes.

fn lsl_imm(value: u32, amount: u32) -> (u32, Option<bool>) {
    if amount == 0 {
        return (value, None);
    }
    (value << amount, Some(value & (1 << (32 - amount)) != 0))
}

fn lsl_reg(value: u32, amount: u32) -> (u32, Option<bool>) {
    match amount {
        0 => (value, None),
        1..=31 => lsl_imm(value, amount),
        32 => (0, Some(value & 1 != 0)),
        _ => (0, Some(false)),
    }
}

/// An immediate of 0 encodes a shift by 32.
fn lsr_imm(value: u32, amount: u32) -> (u32, Option<bool>) {
    if amount == 0 {
        return (0, Some(value & 0x8000_0000 != 0));
    }
    (value >> amount, Some(value & (1 << (amount - 1)) != 0))
}

fn lsr_reg(value: u32, amount: u32) -> (u32, Option<bool>) {
    match amount {
        0 => (value, None),
        // Carry is sampled at bit 32 - n, mirroring LSL.
        1..=31 => (value >> amount, Some(value & (1 << (32 - amount)) != 0)),
        32 => (0, Some(value & 0x8000_0000 != 0)),
        _ => (0, Some(false)),
    }
}

fn asr_fill(value: u32) -> (u32, Option<bool>) {
    if value & 0x8000_0000 != 0 {
        (u32::MAX, Some(true))
    } else {
        (0, Some(false))
    }
}

/// An immediate of 0 encodes a shift by 32.
fn asr_imm(value: u32, amount: u32) -> (u32, Option<bool>) {
    if amount == 0 {
        return asr_fill(value);
    }
    (
        ((value as i32) >> amount) as u32,
        Some(value & (1 << (amount - 1)) != 0),
    )
}

fn asr_reg(value: u32, amount: u32) -> (u32, Option<bool>) {
    match amount {
        0 => (value, None),
        1..=31 => asr_imm(value, amount),
        _ => asr_fill(value),
    }
}

fn ror_reg(value: u32, amount: u32) -> (u32, Option<bool>) {
    if amount == 0 {
        return (value, None);
    }
    match amount & 0x1F {
        0 => (value, Some(value & 0x8000_0000 != 0)),
        n => (value.rotate_right(n), Some(value & (1 << (n - 1)) != 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{RAM_WORDS, ROM_WORDS};

    /// Byte address of the first instruction after reset.
    const ENTRY: usize = 0xC08;

    fn rom_with(code: &[u16]) -> Vec<u16> {
        let mut rom = vec![0u16; ROM_WORDS];
        let start = ENTRY / 2;
        rom[start..start + code.len()].copy_from_slice(code);
        rom
    }

    fn flags(cpu: &Thumbulator) -> (bool, bool, bool, bool) {
        let regs = cpu.registers();
        (
            regs.flag(Cpsr::N),
            regs.flag(Cpsr::Z),
            regs.flag(Cpsr::C),
            regs.flag(Cpsr::V),
        )
    }

    #[test]
    fn test_step_advances_pipeline() {
        let rom = rom_with(&[0x2005]); // movs r0, #5
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        assert_eq!(cpu.step(), Step::Continue);
        assert_eq!(cpu.registers().read_register(0), 5);
        assert_eq!(cpu.registers().read_register(15), 0xC0D);
        assert_eq!(cpu.instructions(), 1);
        assert_eq!(cpu.metrics().fetches, 1);
    }

    #[test]
    fn test_movs_adds_flags() {
        // movs r0, #0xFF; adds r0, #1; subs r0, #0xFF; subs r0, #1
        let rom = rom_with(&[0x20FF, 0x3001, 0x38FF, 0x3801]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        cpu.step();
        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x100);
        assert_eq!(flags(&cpu), (false, false, false, false));

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 1);
        // No borrow
        assert!(cpu.registers().flag(Cpsr::C));

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0);
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn test_add_imm8_overflow_flag_uses_negated_immediate() {
        let rom = rom_with(&[0x3001]); // adds r0, #1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x7FFF_FFFF);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x8000_0000);
        assert!(cpu.registers().flag(Cpsr::N));
        assert!(!cpu.registers().flag(Cpsr::V));
    }

    #[test]
    fn test_add_reg_overflow() {
        let rom = rom_with(&[0x1840]); // adds r0, r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x7FFF_FFFF);
        cpu.registers_mut().write_register(1, 1);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x8000_0000);
        assert_eq!(flags(&cpu), (true, false, false, true));
    }

    #[test]
    fn test_adc_uses_carry() {
        let rom = rom_with(&[0x4148]); // adcs r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0xFFFF_FFFF);
        cpu.registers_mut().write_register(1, 0);
        cpu.registers_mut().do_cflag_bit(true);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0);
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn test_sbc_carry_is_addition_carry() {
        let rom = rom_with(&[0x4188]); // sbcs r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 5);
        cpu.registers_mut().write_register(1, 3);
        cpu.registers_mut().do_cflag_bit(false);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 1);
        assert!(!cpu.registers().flag(Cpsr::C));
    }

    #[test]
    fn test_neg_and_cmp() {
        // negs r0, r1; cmp r1, #1
        let rom = rom_with(&[0x4248, 0x2901]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(1, 1);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0xFFFF_FFFF);
        assert_eq!(flags(&cpu), (true, false, false, false));

        cpu.step();
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn test_neg_zero_sets_carry() {
        let rom = rom_with(&[0x4248]); // negs r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0);
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn test_mul() {
        let rom = rom_with(&[0x4348]); // muls r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x1_0001);
        cpu.registers_mut().write_register(1, 0x1_0000);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x0001_0000u32.wrapping_mul(0x1_0001));
        assert!(!cpu.registers().flag(Cpsr::Z));
    }

    #[test]
    fn test_shift_helpers() {
        assert_eq!(lsl_imm(0x8000_0001, 0), (0x8000_0001, None));
        assert_eq!(lsl_imm(0x8000_0001, 1), (0x2, Some(true)));
        assert_eq!(lsl_reg(0x3, 32), (0, Some(true)));
        assert_eq!(lsl_reg(0x3, 33), (0, Some(false)));

        assert_eq!(lsr_imm(0x8000_0000, 0), (0, Some(true)));
        assert_eq!(lsr_imm(0x3, 1), (0x1, Some(true)));
        // Register form samples bit 32 - n
        assert_eq!(lsr_reg(0x8000_0000, 1), (0x4000_0000, Some(true)));
        assert_eq!(lsr_reg(0x8000_0000, 32), (0, Some(true)));
        assert_eq!(lsr_reg(0x8000_0000, 200), (0, Some(false)));

        assert_eq!(asr_imm(0x8000_0000, 0), (0xFFFF_FFFF, Some(true)));
        assert_eq!(asr_imm(0x4000_0000, 0), (0, Some(false)));
        assert_eq!(asr_imm(0x8000_0002, 1), (0xC000_0001, Some(false)));
        assert_eq!(asr_reg(0x8000_0000, 40), (0xFFFF_FFFF, Some(true)));
        assert_eq!(asr_reg(0x8000_0000, 0), (0x8000_0000, None));

        assert_eq!(ror_reg(0x8000_0001, 0), (0x8000_0001, None));
        assert_eq!(ror_reg(0x8000_0001, 32), (0x8000_0001, Some(true)));
        assert_eq!(ror_reg(0x0000_0001, 1), (0x8000_0000, Some(true)));
        assert_eq!(ror_reg(0x0000_0002, 0x21), (0x0000_0001, Some(false)));
    }

    #[test]
    fn test_shift_register_zero_amount_keeps_carry() {
        let rom = rom_with(&[0x4088]); // lsls r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0);
        cpu.registers_mut().write_register(1, 0x100); // low byte is 0
        cpu.registers_mut().do_cflag_bit(true);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0);
        // N and Z still follow the (unchanged) result
        assert_eq!(flags(&cpu), (false, true, true, false));
    }

    #[test]
    fn test_mov_low_clears_c_and_v() {
        let rom = rom_with(&[0x1C08]); // movs r0, r1
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(1, 0x8000_0000);
        cpu.registers_mut().do_cflag_bit(true);
        cpu.registers_mut().do_vflag_bit(true);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x8000_0000);
        assert_eq!(flags(&cpu), (true, false, false, false));
    }

    #[test]
    fn test_mov_to_pc_adds_two() {
        let rom = rom_with(&[0x4687]); // mov pc, r0
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x1001);

        cpu.step();
        assert_eq!(cpu.registers().read_register(15), 0x1003);
    }

    #[test]
    fn test_add_high_and_pc_relative() {
        // add r8, r1; add r2, pc, #4; ldr r3, [pc, #4]
        let mut rom = rom_with(&[0x4488, 0xA201, 0x4B01]);
        // Literal for the load: (0xC11 & !3) + 4 = 0xC14
        rom[0xC14 / 2] = 0xBEEF;
        rom[0xC16 / 2] = 0xDEAD;
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(8, 10);
        cpu.registers_mut().write_register(1, 5);

        cpu.step();
        assert_eq!(cpu.registers().read_register(8), 15);

        cpu.step();
        // pc = 0xC0F
        assert_eq!(cpu.registers().read_register(2), 0xC10);

        cpu.step();
        assert_eq!(cpu.registers().read_register(3), 0xDEAD_BEEF);
    }

    #[test]
    fn test_extend_and_reverse() {
        // sxtb r0, r4; sxth r1, r4; uxtb r2, r4; uxth r3, r4
        // rev r5, r4; rev16 r6, r4; revsh r7, r4
        let rom = rom_with(&[0xB260, 0xB221, 0xB2E2, 0xB2A3, 0xBA25, 0xBA66, 0xBAE7]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(4, 0x1234_8081);

        for _ in 0..7 {
            assert_eq!(cpu.step(), Step::Continue);
        }
        let r = |n| cpu.registers().read_register(n);
        assert_eq!(r(0), 0xFFFF_FF81);
        assert_eq!(r(1), 0xFFFF_8081);
        assert_eq!(r(2), 0x81);
        assert_eq!(r(3), 0x8081);
        assert_eq!(r(5), 0x8180_3412);
        assert_eq!(r(6), 0x3412_8180);
        assert_eq!(r(7), 0xFFFF_8180);
    }

    #[test]
    fn test_byte_and_halfword_memory() {
        // strb r0, [r1, #0]; ldrb r2, [r1, #0]; ldrsb r3, [r1, r4]
        // strh r0, [r5, #0]; ldrsh r6, [r5, r4]; ldrh r7, [r5, #0]
        let rom = rom_with(&[0x7008, 0x780A, 0x570B, 0x8028, 0x5F2E, 0x882F]);
        let mut ram = vec![0u16; RAM_WORDS];
        ram[0x800] = 0x00CD;
        {
            let mut cpu = Thumbulator::new(&rom, &mut ram);
            cpu.registers_mut().write_register(0, 0x1234_80AB);
            cpu.registers_mut().write_register(1, 0x4000_1001);
            cpu.registers_mut().write_register(4, 0);
            cpu.registers_mut().write_register(5, 0x4000_1010);

            for _ in 0..6 {
                cpu.step();
            }
            let r = |n| cpu.registers().read_register(n);
            assert_eq!(r(2), 0xAB);
            assert_eq!(r(3), 0xFFFF_FFAB);
            assert_eq!(r(6), 0xFFFF_80AB);
            assert_eq!(r(7), 0x80AB);
        }
        // Low byte of the containing half-word survives
        assert_eq!(ram[0x800], 0xABCD);
        assert_eq!(ram[0x808], 0x80AB);
    }

    #[test]
    fn test_word_load_store() {
        // str r0, [r1, #4]; ldr r2, [r1, #4]; str r0, [sp, #8]; ldr r3, [sp, #8]
        let rom = rom_with(&[0x6048, 0x684A, 0x9002, 0x9B02]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0xCAFE_F00D);
        cpu.registers_mut().write_register(1, 0x4000_1000);

        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.registers().read_register(2), 0xCAFE_F00D);
        assert_eq!(cpu.registers().read_register(3), 0xCAFE_F00D);
        assert_eq!(cpu.bus().ram()[0x802], 0xF00D);
        assert_eq!(cpu.bus().ram()[0x803], 0xCAFE);
    }

    #[test]
    fn test_push_pop() {
        // push {r0, r1, lr}; pop {r2, r3, pc}
        let rom = rom_with(&[0xB503, 0xBD0C]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 1);
        cpu.registers_mut().write_register(1, 2);

        cpu.step();
        assert_eq!(cpu.registers().read_register(13), 0x4000_1FA8);
        let ram_view = cpu.bus().ram();
        assert_eq!(ram_view[0x1FA8 / 2], 1);
        assert_eq!(ram_view[0x1FAC / 2], 2);
        assert_eq!(ram_view[0x1FB0 / 2], 0xC00);

        cpu.step();
        assert_eq!(cpu.registers().read_register(2), 1);
        assert_eq!(cpu.registers().read_register(3), 2);
        assert_eq!(cpu.registers().read_register(13), 0x4000_1FB4);
        assert_eq!(cpu.registers().read_register(15), 0xC02);
    }

    #[test]
    fn test_stmia_ldmia() {
        // stmia r0!, {r1, r2, r3}; ldmia r4!, {r5, r6, r7}
        let rom = rom_with(&[0xC00E, 0xCCE0]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x4000_1000);
        cpu.registers_mut().write_register(1, 0x11);
        cpu.registers_mut().write_register(2, 0x22);
        cpu.registers_mut().write_register(3, 0x33);
        cpu.registers_mut().write_register(4, 0x4000_1000);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x4000_100C);
        cpu.step();
        assert_eq!(cpu.registers().read_register(4), 0x4000_100C);
        assert_eq!(cpu.registers().read_register(5), 0x11);
        assert_eq!(cpu.registers().read_register(6), 0x22);
        assert_eq!(cpu.registers().read_register(7), 0x33);
    }

    #[test]
    fn test_branches() {
        // b .
        let rom = rom_with(&[0xE7FE]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        for _ in 0..3 {
            cpu.step();
            assert_eq!(cpu.registers().read_register(15), 0xC0B);
        }
    }

    #[test]
    fn test_conditional_branch() {
        // beq +4 (not taken, Z clear); cmp r0, #0; beq +0
        let rom = rom_with(&[0xD002, 0x2800, 0xD000]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        cpu.step();
        assert_eq!(cpu.registers().read_register(15), 0xC0D);
        cpu.step();
        cpu.step();
        // pc = 0xC11, taken target = 0xC11 + 2 + 0
        assert_eq!(cpu.registers().read_register(15), 0xC13);
    }

    #[test]
    fn test_branch_with_link() {
        // bl +4
        let rom = rom_with(&[0xF000, 0xF802]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        cpu.step();
        assert_eq!(cpu.pending_branch_link(), Some(0xF000));
        cpu.step();
        assert_eq!(cpu.pending_branch_link(), None);
        assert_eq!(cpu.registers().read_register(14), 0xC0D);
        assert_eq!(cpu.registers().read_register(15), 0xC13);
    }

    #[test]
    fn test_branch_with_link_backwards() {
        // bl -8: high half 0x7FF, low half 0x7FC
        let rom = rom_with(&[0xF7FF, 0xFFFC]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        cpu.step();
        cpu.step();
        // 0xC0F - 8
        assert_eq!(cpu.registers().read_register(15), 0xC07);
    }

    #[test]
    fn test_unpaired_bl_suffix_uses_zero() {
        let rom = rom_with(&[0xF801]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        assert_eq!(cpu.step(), Step::Continue);
        assert_eq!(cpu.registers().read_register(15), 0xC0D + 2);
        assert_eq!(cpu.registers().read_register(14), 0xC0B);
    }

    #[test]
    fn test_branch_exchange() {
        // bx r0; blx r1
        let rom = rom_with(&[0x4700, 0x4788]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().write_register(0, 0x0C0B);
        cpu.registers_mut().write_register(1, 0x0D01);

        // Odd target stays in Thumb: 0xC0B + 2 = 0xC0D, next fetch at 0xC0C
        assert_eq!(cpu.step(), Step::Continue);
        assert_eq!(cpu.registers().read_register(15), 0xC0D);

        assert_eq!(cpu.step(), Step::Continue);
        assert_eq!(cpu.registers().read_register(14), 0xC0D);
        assert_eq!(cpu.registers().read_register(15), 0xD03);
    }

    #[test]
    fn test_branch_exchange_to_arm_stops() {
        let rom = rom_with(&[0x4770]); // bx lr
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);

        assert_eq!(
            cpu.step(),
            Step::Stop(StopReason::ExchangeToArm {
                target: Some(0xC02)
            })
        );
    }

    #[test]
    fn test_termination_opcodes() {
        let cases = [
            (0xBE07, StopReason::Breakpoint { imm: 7 }),
            (0xDF01, StopReason::SoftwareInterrupt { imm: 1 }),
            (0xDE00, StopReason::UndefinedInstruction { opcode: 0xDE00 }),
            (0xB800, StopReason::UndefinedInstruction { opcode: 0xB800 }),
            (0xB662, StopReason::ChangeProcessorState),
            (0xB658, StopReason::SetEndianness),
            (0xE801, StopReason::ExchangeToArm { target: None }),
        ];
        for (opcode, expected) in cases {
            let rom = rom_with(&[opcode]);
            let mut ram = vec![0u16; RAM_WORDS];
            let mut cpu = Thumbulator::new(&rom, &mut ram);
            assert_eq!(cpu.step(), Step::Stop(expected), "opcode {:#06x}", opcode);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let rom = rom_with(&[0xF000, 0x2001]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.step();
        cpu.step();
        cpu.bus_mut().write16(crate::bus::MAMCR_ADDR, 2);

        cpu.reset();
        assert_eq!(cpu.pending_branch_link(), None);
        assert_eq!(cpu.instructions(), 0);
        assert_eq!(cpu.bus().mamcr(), 0);
        assert_eq!(cpu.metrics(), ExecutionMetrics::default());
        assert_eq!(cpu.registers().read_register(0), 0);
        assert_eq!(cpu.registers().read_register(15), 0xC0B);
    }

    #[test]
    fn test_snapshot() {
        let rom = rom_with(&[0x2007, 0xBE00]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        assert_eq!(cpu.run().unwrap(), StopReason::Breakpoint { imm: 0 });

        let snap = cpu.snapshot();
        assert_eq!(snap.registers[0], 7);
        assert_eq!(snap.pc, 0xC0F);
        assert_eq!(snap.sp_svc, 0x4000_1FB4);
        assert_eq!(snap.lr_svc, 0xC00);
        assert_eq!(snap.cpsr, 0xF3);
        assert_eq!(snap.metrics.instructions, 2);
    }

    /// Run a single instruction with C and V preset; returns r0 and the flags.
    fn run_one(opcode: u16, setup: &[(u8, u32)]) -> (u32, (bool, bool, bool, bool)) {
        let rom = rom_with(&[opcode]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        for &(reg, value) in setup {
            cpu.registers_mut().write_register(reg, value);
        }
        cpu.registers_mut().do_cflag_bit(true);
        cpu.registers_mut().do_vflag_bit(true);

        assert_eq!(cpu.step(), Step::Continue);
        (cpu.registers().read_register(0), flags(&cpu))
    }

    #[test]
    fn test_logical_ops_leave_carry_and_overflow() {
        // (opcode, r0, r1, result, N, Z)
        let cases = [
            (0x4008, 0xF0F0_FFFF, 0x8F00_0F0F, 0x8000_0F0F, true, false), // ands r0, r1
            (0x4008, 0x0000_000F, 0x0000_00F0, 0, false, true),
            (0x4048, 0x1234_5678, 0xFFFF_FFFF, 0xEDCB_A987, true, false), // eors r0, r1
            (0x4048, 0x5555_AAAA, 0x5555_AAAA, 0, false, true),
            (0x4308, 0x8000_0000, 0x0000_0001, 0x8000_0001, true, false), // orrs r0, r1
            (0x4388, 0xFFFF_FFFF, 0x8000_0000, 0x7FFF_FFFF, false, false), // bics r0, r1
            (0x43C8, 0x1234_5678, 0xFFFF_FFFF, 0, false, true), // mvns r0, r1
            (0x43C8, 0x0000_0000, 0x7FFF_FFFF, 0x8000_0000, true, false),
        ];
        for (opcode, a, b, result, n, z) in cases {
            let (r0, nzcv) = run_one(opcode, &[(0, a), (1, b)]);
            assert_eq!(r0, result, "{:#06x}", opcode);
            assert_eq!(nzcv, (n, z, true, true), "{:#06x}", opcode);
        }
    }

    #[test]
    fn test_tst_only_sets_flags() {
        // tst r0, r1
        let (r0, nzcv) = run_one(0x4208, &[(0, 0x8000_0001), (1, 0x8000_0000)]);
        assert_eq!(r0, 0x8000_0001);
        assert_eq!(nzcv, (true, false, true, true));

        let (r0, nzcv) = run_one(0x4208, &[(0, 0x0000_00F0), (1, 0x0000_000F)]);
        assert_eq!(r0, 0xF0);
        assert_eq!(nzcv, (false, true, true, true));
    }

    #[test]
    fn test_cmn_and_cmp_register() {
        // cmn r0, r1
        let (r0, nzcv) = run_one(0x42C8, &[(0, 0xFFFF_FFFF), (1, 1)]);
        assert_eq!(r0, 0xFFFF_FFFF);
        assert_eq!(nzcv, (false, true, true, false));
        let (_, nzcv) = run_one(0x42C8, &[(0, 0x7FFF_FFFF), (1, 1)]);
        assert_eq!(nzcv, (true, false, false, true));

        // cmp r0, r1
        let (r0, nzcv) = run_one(0x4288, &[(0, 1), (1, 2)]);
        assert_eq!(r0, 1);
        assert_eq!(nzcv, (true, false, false, false));
        let (_, nzcv) = run_one(0x4288, &[(0, 0x8000_0000), (1, 1)]);
        assert_eq!(nzcv, (false, false, true, true));
    }

    #[test]
    fn test_cmp_high_registers() {
        // cmp r8, r9
        let (_, nzcv) = run_one(0x45C8, &[(8, 5), (9, 5)]);
        assert_eq!(nzcv, (false, true, true, false));

        // cmp r0, r8
        let (r0, nzcv) = run_one(0x4540, &[(0, 3), (8, 5)]);
        assert_eq!(r0, 3);
        assert_eq!(nzcv, (true, false, false, false));
    }

    #[test]
    fn test_sub_imm3_and_register() {
        // subs r0, r1, #3
        let (r0, nzcv) = run_one(0x1EC8, &[(1, 2)]);
        assert_eq!(r0, 0xFFFF_FFFF);
        assert_eq!(nzcv, (true, false, false, false));

        // subs r0, r1, r2
        let (r0, nzcv) = run_one(0x1A88, &[(1, 0x8000_0000), (2, 1)]);
        assert_eq!(r0, 0x7FFF_FFFF);
        assert_eq!(nzcv, (false, false, true, true));
    }

    #[test]
    fn test_shift_immediate_forms() {
        // (opcode, r1, result, N, Z, C)
        let cases = [
            (0x0848, 0x8000_0002, 0x4000_0001, false, false, false), // lsrs r0, r1, #1
            (0x0808, 0x8000_0000, 0, false, true, true), // lsrs r0, r1, #32
            (0x1048, 0x8000_0003, 0xC000_0001, true, false, true), // asrs r0, r1, #1
            (0x1008, 0x4000_0000, 0, false, true, false), // asrs r0, r1, #32
            (0x1008, 0x8000_0000, 0xFFFF_FFFF, true, false, true),
        ];
        for (opcode, value, result, n, z, c) in cases {
            let (r0, nzcv) = run_one(opcode, &[(1, value)]);
            assert_eq!(r0, result, "{:#06x}", opcode);
            assert_eq!(nzcv, (n, z, c, true), "{:#06x}", opcode);
        }
    }

    #[test]
    fn test_shift_register_forms() {
        const VALUE: u32 = 0x8000_0002;
        // (opcode, amount, result, N, Z, C)
        let cases = [
            // lsls r0, r1
            (0x4088, 0, VALUE, true, false, true),
            (0x4088, 1, 0x0000_0004, false, false, true),
            (0x4088, 31, 0, false, true, true),
            (0x4088, 32, 0, false, true, false),
            (0x4088, 33, 0, false, true, false),
            // lsrs r0, r1
            (0x40C8, 0, VALUE, true, false, true),
            (0x40C8, 1, 0x4000_0001, false, false, true),
            (0x40C8, 31, 0x0000_0001, false, false, true),
            (0x40C8, 32, 0, false, true, true),
            (0x40C8, 33, 0, false, true, false),
            // asrs r0, r1
            (0x4108, 0, VALUE, true, false, true),
            (0x4108, 1, 0xC000_0001, true, false, false),
            (0x4108, 31, 0xFFFF_FFFF, true, false, false),
            (0x4108, 32, 0xFFFF_FFFF, true, false, true),
            (0x4108, 33, 0xFFFF_FFFF, true, false, true),
            // rors r0, r1
            (0x41C8, 0, VALUE, true, false, true),
            (0x41C8, 1, 0x4000_0001, false, false, false),
            (0x41C8, 31, 0x0000_0005, false, false, false),
            (0x41C8, 32, VALUE, true, false, true),
            (0x41C8, 33, 0x4000_0001, false, false, false),
        ];
        for (opcode, amount, result, n, z, c) in cases {
            let (r0, nzcv) = run_one(opcode, &[(0, VALUE), (1, amount)]);
            assert_eq!(r0, result, "{:#06x} by {}", opcode, amount);
            assert_eq!(nzcv, (n, z, c, true), "{:#06x} by {}", opcode, amount);
        }

        // Only the low byte of the amount register counts.
        let (r0, nzcv) = run_one(0x4088, &[(0, VALUE), (1, 0x0000_0101)]);
        assert_eq!(r0, 0x0000_0004);
        assert_eq!(nzcv, (false, false, true, true));

        let (r0, nzcv) = run_one(0x4108, &[(0, 0x4000_0000), (1, 33)]);
        assert_eq!(r0, 0);
        assert_eq!(nzcv, (false, true, false, true));
    }

    #[test]
    fn test_register_offset_memory() {
        let rom = rom_with(&[
            0x5088, // str r0, [r1, r2]
            0x588B, // ldr r3, [r1, r2]
            0x5308, // strh r0, [r1, r4]
            0x5B0D, // ldrh r5, [r1, r4]
            0x5588, // strb r0, [r1, r6]
            0x5D8F, // ldrb r7, [r1, r6]
        ]);
        let mut ram = vec![0u16; RAM_WORDS];
        ram[0x1020 / 2] = 0x0077;
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        for (reg, value) in [(0, 0xCAFE_F00D), (1, 0x4000_1000), (2, 8), (4, 0x10), (6, 0x21)] {
            cpu.registers_mut().write_register(reg, value);
        }
        cpu.registers_mut().do_cflag_bit(true);
        cpu.registers_mut().do_vflag_bit(true);

        for _ in 0..6 {
            assert_eq!(cpu.step(), Step::Continue);
        }

        assert_eq!(cpu.registers().read_register(3), 0xCAFE_F00D);
        assert_eq!(cpu.registers().read_register(5), 0xF00D);
        assert_eq!(cpu.registers().read_register(7), 0x0D);
        assert_eq!(flags(&cpu), (false, false, true, true));

        let ram_view = cpu.bus().ram();
        assert_eq!(&ram_view[0x1008 / 2..0x1008 / 2 + 2], &[0xF00D, 0xCAFE]);
        assert_eq!(ram_view[0x1010 / 2], 0xF00D);
        // Odd byte address merges into the high half.
        assert_eq!(ram_view[0x1020 / 2], 0x0D77);
    }

    #[test]
    fn test_stack_pointer_arithmetic() {
        // add r0, sp, #8; add sp, #16; sub sp, #16
        let rom = rom_with(&[0xA802, 0xB004, 0xB084]);
        let mut ram = vec![0u16; RAM_WORDS];
        let mut cpu = Thumbulator::new(&rom, &mut ram);
        cpu.registers_mut().do_cflag_bit(true);
        cpu.registers_mut().do_vflag_bit(true);

        cpu.step();
        assert_eq!(cpu.registers().read_register(0), 0x4000_1FBC);
        assert_eq!(cpu.registers().read_register(13), 0x4000_1FB4);

        cpu.step();
        assert_eq!(cpu.registers().read_register(13), 0x4000_1FC4);

        cpu.step();
        assert_eq!(cpu.registers().read_register(13), 0x4000_1FB4);
        assert_eq!(flags(&cpu), (false, false, true, true));
    }

    #[test]
    fn test_cpy_keeps_flags() {
        // cpy r0, r1
        let (r0, nzcv) = run_one(0x4608, &[(0, 0x1234), (1, 0)]);
        assert_eq!(r0, 0);
        assert_eq!(nzcv, (false, false, true, true));
    }
}
