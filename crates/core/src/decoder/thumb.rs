// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Instruction {
    // Arithmetic
    Adc { rd: u8, rm: u8 },              // ADC Rd, Rm
    AddImm3 { rd: u8, rn: u8, imm: u32 }, // ADD Rd, Rn, #imm3
    AddImm8 { rd: u8, imm: u32 },         // ADD Rd, #imm8
    AddReg { rd: u8, rn: u8, rm: u8 },    // ADD Rd, Rn, Rm
    AddHigh { rd: u8, rm: u8 },           // ADD Rd, Rm (either may be high)
    AddPc { rd: u8, imm: u32 },           // ADD Rd, PC, #imm8*4
    AddSp { rd: u8, imm: u32 },           // ADD Rd, SP, #imm8*4
    AddSpImm { imm: u32 },                // ADD SP, #imm7*4
    Sbc { rd: u8, rm: u8 },
    SubImm3 { rd: u8, rn: u8, imm: u32 },
    SubImm8 { rd: u8, imm: u32 },
    SubReg { rd: u8, rn: u8, rm: u8 },
    SubSpImm { imm: u32 }, // SUB SP, #imm7*4
    Neg { rd: u8, rm: u8 },
    Mul { rd: u8, rm: u8 },

    // Compare
    Cmn { rn: u8, rm: u8 },
    CmpImm { rn: u8, imm: u32 },
    CmpReg { rn: u8, rm: u8 },
    CmpHigh { rn: u8, rm: u8 },

    // Logic
    And { rd: u8, rm: u8 },
    Orr { rd: u8, rm: u8 },
    Eor { rd: u8, rm: u8 },
    Bic { rd: u8, rm: u8 },
    Mvn { rd: u8, rm: u8 },
    Tst { rn: u8, rm: u8 },

    // Shifts
    LslImm { rd: u8, rm: u8, imm: u8 },
    LsrImm { rd: u8, rm: u8, imm: u8 },
    AsrImm { rd: u8, rm: u8, imm: u8 },
    LslReg { rd: u8, rs: u8 },
    LsrReg { rd: u8, rs: u8 },
    AsrReg { rd: u8, rs: u8 },
    Ror { rd: u8, rs: u8 },

    // Moves
    MovImm { rd: u8, imm: u32 }, // MOV Rd, #imm8
    MovLow { rd: u8, rn: u8 },   // MOV Rd, Rn (encoded as ADD Rd, Rn, #0)
    MovHigh { rd: u8, rm: u8 },  // MOV Rd, Rm (either may be high)
    Cpy { rd: u8, rm: u8 },

    // Extend / reverse
    Sxtb { rd: u8, rm: u8 },
    Sxth { rd: u8, rm: u8 },
    Uxtb { rd: u8, rm: u8 },
    Uxth { rd: u8, rm: u8 },
    Rev { rd: u8, rn: u8 },
    Rev16 { rd: u8, rn: u8 },
    Revsh { rd: u8, rn: u8 },

    // Loads
    LdrImm { rd: u8, rn: u8, offset: u32 },
    LdrReg { rd: u8, rn: u8, rm: u8 },
    LdrPc { rd: u8, offset: u32 },
    LdrSp { rd: u8, offset: u32 },
    LdrbImm { rd: u8, rn: u8, offset: u32 },
    LdrbReg { rd: u8, rn: u8, rm: u8 },
    LdrhImm { rd: u8, rn: u8, offset: u32 },
    LdrhReg { rd: u8, rn: u8, rm: u8 },
    Ldrsb { rd: u8, rn: u8, rm: u8 },
    Ldrsh { rd: u8, rn: u8, rm: u8 },
    Ldmia { rn: u8, registers: u8 },
    Pop { registers: u8, pc: bool },

    // Stores
    StrImm { rd: u8, rn: u8, offset: u32 },
    StrReg { rd: u8, rn: u8, rm: u8 },
    StrSp { rd: u8, offset: u32 },
    StrbImm { rd: u8, rn: u8, offset: u32 },
    StrbReg { rd: u8, rn: u8, rm: u8 },
    StrhImm { rd: u8, rn: u8, offset: u32 },
    StrhReg { rd: u8, rn: u8, rm: u8 },
    Stmia { rn: u8, registers: u8 },
    Push { registers: u8, lr: bool },

    // Branches
    BranchCond { cond: u8, offset: i32 }, // B<cond> <label>
    Branch { offset: i32 },               // B <label>
    BlPrefix { opcode: u16 },             // BL, first half
    BlSuffix { low: u16 },                // BL, second half
    BlxSuffix,                            // BLX <label>, second half (ARM target)
    Bx { rm: u8 },
    BlxReg { rm: u8 },

    // Termination
    Bkpt { imm: u8 },
    Swi { imm: u8 },
    Cps,
    Setend,

    Undefined(u16),
}

/// One decode table row: an opcode matches when `opcode & mask == value`.
pub struct Pattern {
    pub mask: u16,
    pub value: u16,
    pub mnemonic: &'static str,
    pub extract: fn(u16) -> Instruction,
}

impl Pattern {
    pub fn matches(&self, opcode: u16) -> bool {
        opcode & self.mask == self.value
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:#06x}/{:#06x})",
            self.mnemonic, self.mask, self.value
        )
    }
}

/// 3-bit register field at `shift`.
fn low(op: u16, shift: u16) -> u8 {
    ((op >> shift) & 0x7) as u8
}

/// 4-bit register number built from a 3-bit field at bit 0 and the H1 bit (7).
fn high_rd(op: u16) -> u8 {
    ((op & 0x7) | ((op >> 4) & 0x8)) as u8
}

/// 4-bit register number at bits 3..6 (H2 folded in).
fn high_rm(op: u16) -> u8 {
    ((op >> 3) & 0xF) as u8
}

fn imm8(op: u16) -> u32 {
    u32::from(op & 0xFF)
}

fn imm5(op: u16) -> u32 {
    u32::from((op >> 6) & 0x1F)
}

fn sext(value: u16, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((u32::from(value) << shift) as i32) >> shift
}

/// The decode table.
///
/// First match wins. Where two rows overlap, the earlier row is strictly more
/// specific: MOV(2) is ADD(1) with a zero immediate, CPY is MOV(3) with two
/// low registers, and SWI and the reserved condition 0xE live inside the
/// conditional-branch space.
#[rustfmt::skip]
pub static PATTERNS: &[Pattern] = &[
    Pattern { mask: 0xFFC0, value: 0x4140, mnemonic: "ADC", extract: |op| Instruction::Adc { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x1C00, mnemonic: "MOV(2)", extract: |op| Instruction::MovLow { rd: low(op, 0), rn: low(op, 3) } },
    Pattern { mask: 0xFE00, value: 0x1C00, mnemonic: "ADD(1)", extract: |op| Instruction::AddImm3 { rd: low(op, 0), rn: low(op, 3), imm: u32::from(low(op, 6)) } },
    Pattern { mask: 0xF800, value: 0x3000, mnemonic: "ADD(2)", extract: |op| Instruction::AddImm8 { rd: low(op, 8), imm: imm8(op) } },
    Pattern { mask: 0xFE00, value: 0x1800, mnemonic: "ADD(3)", extract: |op| Instruction::AddReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xFF00, value: 0x4400, mnemonic: "ADD(4)", extract: |op| Instruction::AddHigh { rd: high_rd(op), rm: high_rm(op) } },
    Pattern { mask: 0xF800, value: 0xA000, mnemonic: "ADD(5)", extract: |op| Instruction::AddPc { rd: low(op, 8), imm: imm8(op) << 2 } },
    Pattern { mask: 0xF800, value: 0xA800, mnemonic: "ADD(6)", extract: |op| Instruction::AddSp { rd: low(op, 8), imm: imm8(op) << 2 } },
    Pattern { mask: 0xFF80, value: 0xB000, mnemonic: "ADD(7)", extract: |op| Instruction::AddSpImm { imm: u32::from(op & 0x7F) << 2 } },
    Pattern { mask: 0xFFC0, value: 0x4000, mnemonic: "AND", extract: |op| Instruction::And { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xF800, value: 0x1000, mnemonic: "ASR(1)", extract: |op| Instruction::AsrImm { rd: low(op, 0), rm: low(op, 3), imm: imm5(op) as u8 } },
    Pattern { mask: 0xFFC0, value: 0x4100, mnemonic: "ASR(2)", extract: |op| Instruction::AsrReg { rd: low(op, 0), rs: low(op, 3) } },
    Pattern { mask: 0xFF00, value: 0xDF00, mnemonic: "SWI", extract: |op| Instruction::Swi { imm: (op & 0xFF) as u8 } },
    Pattern { mask: 0xFF00, value: 0xDE00, mnemonic: "UNDEF", extract: Instruction::Undefined },
    Pattern { mask: 0xF000, value: 0xD000, mnemonic: "B(1)", extract: |op| Instruction::BranchCond { cond: ((op >> 8) & 0xF) as u8, offset: sext(op & 0xFF, 8) << 1 } },
    Pattern { mask: 0xF800, value: 0xE000, mnemonic: "B(2)", extract: |op| Instruction::Branch { offset: sext(op & 0x7FF, 11) << 1 } },
    Pattern { mask: 0xFFC0, value: 0x4380, mnemonic: "BIC", extract: |op| Instruction::Bic { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFF00, value: 0xBE00, mnemonic: "BKPT", extract: |op| Instruction::Bkpt { imm: (op & 0xFF) as u8 } },
    Pattern { mask: 0xF800, value: 0xF000, mnemonic: "BL", extract: |op| Instruction::BlPrefix { opcode: op } },
    Pattern { mask: 0xF800, value: 0xF800, mnemonic: "BL", extract: |op| Instruction::BlSuffix { low: op & 0x7FF } },
    Pattern { mask: 0xF800, value: 0xE800, mnemonic: "BLX(1)", extract: |_| Instruction::BlxSuffix },
    Pattern { mask: 0xFF87, value: 0x4780, mnemonic: "BLX(2)", extract: |op| Instruction::BlxReg { rm: high_rm(op) } },
    Pattern { mask: 0xFF87, value: 0x4700, mnemonic: "BX", extract: |op| Instruction::Bx { rm: high_rm(op) } },
    Pattern { mask: 0xFFC0, value: 0x42C0, mnemonic: "CMN", extract: |op| Instruction::Cmn { rn: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xF800, value: 0x2800, mnemonic: "CMP(1)", extract: |op| Instruction::CmpImm { rn: low(op, 8), imm: imm8(op) } },
    Pattern { mask: 0xFFC0, value: 0x4280, mnemonic: "CMP(2)", extract: |op| Instruction::CmpReg { rn: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFF00, value: 0x4500, mnemonic: "CMP(3)", extract: |op| Instruction::CmpHigh { rn: high_rd(op), rm: high_rm(op) } },
    Pattern { mask: 0xFFE8, value: 0xB660, mnemonic: "CPS", extract: |_| Instruction::Cps },
    Pattern { mask: 0xFFC0, value: 0x4600, mnemonic: "CPY", extract: |op| Instruction::Cpy { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x4040, mnemonic: "EOR", extract: |op| Instruction::Eor { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xF800, value: 0xC800, mnemonic: "LDMIA", extract: |op| Instruction::Ldmia { rn: low(op, 8), registers: (op & 0xFF) as u8 } },
    Pattern { mask: 0xF800, value: 0x6800, mnemonic: "LDR(1)", extract: |op| Instruction::LdrImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) << 2 } },
    Pattern { mask: 0xFE00, value: 0x5800, mnemonic: "LDR(2)", extract: |op| Instruction::LdrReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xF800, value: 0x4800, mnemonic: "LDR(3)", extract: |op| Instruction::LdrPc { rd: low(op, 8), offset: imm8(op) << 2 } },
    Pattern { mask: 0xF800, value: 0x9800, mnemonic: "LDR(4)", extract: |op| Instruction::LdrSp { rd: low(op, 8), offset: imm8(op) << 2 } },
    Pattern { mask: 0xF800, value: 0x7800, mnemonic: "LDRB(1)", extract: |op| Instruction::LdrbImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) } },
    Pattern { mask: 0xFE00, value: 0x5C00, mnemonic: "LDRB(2)", extract: |op| Instruction::LdrbReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xF800, value: 0x8800, mnemonic: "LDRH(1)", extract: |op| Instruction::LdrhImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) << 1 } },
    Pattern { mask: 0xFE00, value: 0x5A00, mnemonic: "LDRH(2)", extract: |op| Instruction::LdrhReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xFE00, value: 0x5600, mnemonic: "LDRSB", extract: |op| Instruction::Ldrsb { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xFE00, value: 0x5E00, mnemonic: "LDRSH", extract: |op| Instruction::Ldrsh { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xF800, value: 0x0000, mnemonic: "LSL(1)", extract: |op| Instruction::LslImm { rd: low(op, 0), rm: low(op, 3), imm: imm5(op) as u8 } },
    Pattern { mask: 0xFFC0, value: 0x4080, mnemonic: "LSL(2)", extract: |op| Instruction::LslReg { rd: low(op, 0), rs: low(op, 3) } },
    Pattern { mask: 0xF800, value: 0x0800, mnemonic: "LSR(1)", extract: |op| Instruction::LsrImm { rd: low(op, 0), rm: low(op, 3), imm: imm5(op) as u8 } },
    Pattern { mask: 0xFFC0, value: 0x40C0, mnemonic: "LSR(2)", extract: |op| Instruction::LsrReg { rd: low(op, 0), rs: low(op, 3) } },
    Pattern { mask: 0xF800, value: 0x2000, mnemonic: "MOV(1)", extract: |op| Instruction::MovImm { rd: low(op, 8), imm: imm8(op) } },
    Pattern { mask: 0xFF00, value: 0x4600, mnemonic: "MOV(3)", extract: |op| Instruction::MovHigh { rd: high_rd(op), rm: high_rm(op) } },
    Pattern { mask: 0xFFC0, value: 0x4340, mnemonic: "MUL", extract: |op| Instruction::Mul { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x43C0, mnemonic: "MVN", extract: |op| Instruction::Mvn { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x4240, mnemonic: "NEG", extract: |op| Instruction::Neg { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x4300, mnemonic: "ORR", extract: |op| Instruction::Orr { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFE00, value: 0xBC00, mnemonic: "POP", extract: |op| Instruction::Pop { registers: (op & 0xFF) as u8, pc: op & 0x100 != 0 } },
    Pattern { mask: 0xFE00, value: 0xB400, mnemonic: "PUSH", extract: |op| Instruction::Push { registers: (op & 0xFF) as u8, lr: op & 0x100 != 0 } },
    Pattern { mask: 0xFFC0, value: 0xBA00, mnemonic: "REV", extract: |op| Instruction::Rev { rd: low(op, 0), rn: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0xBA40, mnemonic: "REV16", extract: |op| Instruction::Rev16 { rd: low(op, 0), rn: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0xBAC0, mnemonic: "REVSH", extract: |op| Instruction::Revsh { rd: low(op, 0), rn: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x41C0, mnemonic: "ROR", extract: |op| Instruction::Ror { rd: low(op, 0), rs: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x4180, mnemonic: "SBC", extract: |op| Instruction::Sbc { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFF7, value: 0xB650, mnemonic: "SETEND", extract: |_| Instruction::Setend },
    Pattern { mask: 0xF800, value: 0xC000, mnemonic: "STMIA", extract: |op| Instruction::Stmia { rn: low(op, 8), registers: (op & 0xFF) as u8 } },
    Pattern { mask: 0xF800, value: 0x6000, mnemonic: "STR(1)", extract: |op| Instruction::StrImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) << 2 } },
    Pattern { mask: 0xFE00, value: 0x5000, mnemonic: "STR(2)", extract: |op| Instruction::StrReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xF800, value: 0x9000, mnemonic: "STR(3)", extract: |op| Instruction::StrSp { rd: low(op, 8), offset: imm8(op) << 2 } },
    Pattern { mask: 0xF800, value: 0x7000, mnemonic: "STRB(1)", extract: |op| Instruction::StrbImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) } },
    Pattern { mask: 0xFE00, value: 0x5400, mnemonic: "STRB(2)", extract: |op| Instruction::StrbReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xF800, value: 0x8000, mnemonic: "STRH(1)", extract: |op| Instruction::StrhImm { rd: low(op, 0), rn: low(op, 3), offset: imm5(op) << 1 } },
    Pattern { mask: 0xFE00, value: 0x5200, mnemonic: "STRH(2)", extract: |op| Instruction::StrhReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xFE00, value: 0x1E00, mnemonic: "SUB(1)", extract: |op| Instruction::SubImm3 { rd: low(op, 0), rn: low(op, 3), imm: u32::from(low(op, 6)) } },
    Pattern { mask: 0xF800, value: 0x3800, mnemonic: "SUB(2)", extract: |op| Instruction::SubImm8 { rd: low(op, 8), imm: imm8(op) } },
    Pattern { mask: 0xFE00, value: 0x1A00, mnemonic: "SUB(3)", extract: |op| Instruction::SubReg { rd: low(op, 0), rn: low(op, 3), rm: low(op, 6) } },
    Pattern { mask: 0xFF80, value: 0xB080, mnemonic: "SUB(4)", extract: |op| Instruction::SubSpImm { imm: u32::from(op & 0x7F) << 2 } },
    Pattern { mask: 0xFFC0, value: 0xB240, mnemonic: "SXTB", extract: |op| Instruction::Sxtb { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0xB200, mnemonic: "SXTH", extract: |op| Instruction::Sxth { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0x4200, mnemonic: "TST", extract: |op| Instruction::Tst { rn: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0xB2C0, mnemonic: "UXTB", extract: |op| Instruction::Uxtb { rd: low(op, 0), rm: low(op, 3) } },
    Pattern { mask: 0xFFC0, value: 0xB280, mnemonic: "UXTH", extract: |op| Instruction::Uxth { rd: low(op, 0), rm: low(op, 3) } },
];

/// Find the first table row matching `opcode`.
pub fn lookup(opcode: u16) -> Option<&'static Pattern> {
    PATTERNS.iter().find(|p| p.matches(opcode))
}

pub fn decode_thumb_16(opcode: u16) -> Instruction {
    match lookup(opcode) {
        Some(pattern) => (pattern.extract)(opcode),
        None => Instruction::Undefined(opcode),
    }
}
