// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::metrics::ExecutionMetrics;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the interpreter's architectural state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ThumbSnapshot {
    /// Shared bank r0..r15.
    pub registers: Vec<u32>,
    pub sp_svc: u32,
    pub lr_svc: u32,
    pub pc: u32,
    pub cpsr: u32,
    pub mamcr: u32,
    pub pending_branch_link: Option<u16>,
    pub metrics: ExecutionMetrics,
}

impl std::fmt::Display for ThumbSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, value) in self.registers.iter().enumerate().take(13) {
            write!(f, "r{:<2} = {:#010x}", i, value)?;
            if i % 4 == 3 {
                writeln!(f)?;
            } else {
                write!(f, "  ")?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "sp  = {:#010x}  lr  = {:#010x}  pc  = {:#010x}",
            self.sp_svc, self.lr_svc, self.pc
        )?;
        writeln!(f, "cpsr = {:#010x}  mamcr = {:#010x}", self.cpsr, self.mamcr)?;
        write!(f, "{}", self.metrics)
    }
}
