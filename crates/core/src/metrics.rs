// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Bus traffic counters. Observational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCounters {
    pub fetches: u64,
    pub reads: u64,
    pub writes: u64,
}

impl AccessCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-run execution statistics of one interpreter instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub instructions: u64,
    pub fetches: u64,
    pub reads: u64,
    pub writes: u64,
}

impl ExecutionMetrics {
    pub fn new(instructions: u64, access: AccessCounters) -> Self {
        Self {
            instructions,
            fetches: access.fetches,
            reads: access.reads,
            writes: access.writes,
        }
    }
}

impl std::fmt::Display for ExecutionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} instructions, {} fetches, {} reads, {} writes",
            self.instructions, self.fetches, self.reads, self.writes
        )
    }
}
