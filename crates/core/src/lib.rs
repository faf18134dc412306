// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod audio;
pub mod bus;
pub mod config;
pub mod cpu;
pub mod decoder;
pub mod memory;
pub mod metrics;
pub mod snapshot;


pub use config::ThumbConfig;
pub use cpu::{Step, Thumbulator};

/// Hard ceiling on executed instructions per `run()`.
///
/// The embedded program has no notion of "done" beyond its own control flow,
/// so a program that never reaches a terminating opcode must still hand
/// control back to the host.
pub const MAX_INSTRUCTIONS: u64 = 500_000;

#[derive(Debug, thiserror::Error)]
pub enum ThumbError {
    #[error("Fatal stop ({reason})\n{snapshot}")]
    Fatal {
        reason: StopReason,
        snapshot: Box<snapshot::ThumbSnapshot>,
    },
    #[error("Sound state belongs to {found:?}, expected {expected:?}")]
    StateNameMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("Sound state truncated: needed {needed} bytes, got {got}")]
    TruncatedState { needed: usize, got: usize },
}

pub type ThumbResult<T> = Result<T, ThumbError>;

/// Why the interpreter handed control back to the host.
///
/// Every variant ends execution at the same point in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// BKPT with its 8-bit comment field.
    Breakpoint { imm: u8 },
    /// SWI with its 8-bit comment field.
    SoftwareInterrupt { imm: u8 },
    /// No table entry matched, or the reserved branch condition 0xE.
    UndefinedInstruction { opcode: u16 },
    /// BX/BLX to an ARM-state target, or the BLX(1) suffix half (no target).
    ExchangeToArm { target: Option<u32> },
    /// CPS
    ChangeProcessorState,
    /// SETEND
    SetEndianness,
    MaxInstructionsReached,
}

impl StopReason {
    /// Stops that indicate the program went somewhere it should not have.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StopReason::UndefinedInstruction { .. } | StopReason::MaxInstructionsReached
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Breakpoint { imm } => write!(f, "breakpoint #{imm}"),
            StopReason::SoftwareInterrupt { imm } => write!(f, "software interrupt #{imm}"),
            StopReason::UndefinedInstruction { opcode } => {
                write!(f, "undefined instruction {opcode:#06x}")
            }
            StopReason::ExchangeToArm { target: Some(t) } => {
                write!(f, "exchange to ARM state at {t:#010x}")
            }
            StopReason::ExchangeToArm { target: None } => write!(f, "BLX suffix to ARM state"),
            StopReason::ChangeProcessorState => write!(f, "change processor state"),
            StopReason::SetEndianness => write!(f, "set endianness"),
            StopReason::MaxInstructionsReached => {
                write!(f, "instruction limit of {MAX_INSTRUCTIONS} reached")
            }
        }
    }
}
