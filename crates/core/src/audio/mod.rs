// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Timestamped sound-register scheduling.
//!
//! Writes to the console's sound registers are queued with the emulated time
//! that elapsed since the previous write. `render_into` replays them against
//! the host's output rate, splitting synthesis at each write so register
//! changes land at the right sample.

use crate::{ThumbError, ThumbResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Host output rate in samples per second.
pub const OUTPUT_FREQUENCY: u32 = 31_400;
/// Emulated CPU clock used to turn cycle stamps into seconds.
pub const CPU_CLOCK_HZ: f64 = 1_193_191.666_666_67;
/// Interleaved output channels.
pub const CHANNELS: usize = 2;
/// Sound registers persisted by `save_state`.
pub const SOUND_REGISTERS: [u16; 6] = [0x15, 0x16, 0x17, 0x18, 0x19, 0x1A];
/// Name tag at the start of a serialized `SoundState`.
pub const STATE_NAME: &str = "TIASound";

/// The synthesizer behind the scheduler.
pub trait SoundChip {
    fn set(&mut self, addr: u16, value: u8);
    fn get(&self, addr: u16) -> u8;
    /// Render `frames` interleaved stereo frames into `buffer`.
    fn process(&mut self, buffer: &mut [i16], frames: usize);
    fn reset(&mut self);
    fn set_volume(&mut self, _percent: u8) {}
}

/// Register file with no synthesis; renders silence.
#[derive(Debug, Clone, Default)]
pub struct NullChip {
    registers: [u8; 6],
}

impl SoundChip for NullChip {
    fn set(&mut self, addr: u16, value: u8) {
        if let Some(i) = SOUND_REGISTERS.iter().position(|&r| r == addr) {
            self.registers[i] = value;
        }
    }

    fn get(&self, addr: u16) -> u8 {
        SOUND_REGISTERS
            .iter()
            .position(|&r| r == addr)
            .map_or(0, |i| self.registers[i])
    }

    fn process(&mut self, buffer: &mut [i16], frames: usize) {
        let end = (frames * CHANNELS).min(buffer.len());
        buffer[..end].fill(0);
    }

    fn reset(&mut self) {
        self.registers = [0; 6];
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegWrite {
    pub addr: u16,
    pub value: u8,
    /// Seconds since the previous queued write.
    pub delta: f64,
}

/// Persisted sound registers and the last write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundState {
    pub registers: [u8; 6],
    pub last_register_set_cycle: i32,
}

impl SoundState {
    /// `u32` LE name length, name, six register bytes, `i32` LE cycle.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + STATE_NAME.len() + 6 + 4);
        out.extend_from_slice(&(STATE_NAME.len() as u32).to_le_bytes());
        out.extend_from_slice(STATE_NAME.as_bytes());
        out.extend_from_slice(&self.registers);
        out.extend_from_slice(&self.last_register_set_cycle.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ThumbResult<Self> {
        let name_len = take::<4>(bytes, 0)?;
        let name_len = u32::from_le_bytes(name_len) as usize;
        let name_end = 4usize.saturating_add(name_len);
        let name = bytes.get(4..name_end).ok_or(ThumbError::TruncatedState {
            needed: name_end,
            got: bytes.len(),
        })?;
        if name != STATE_NAME.as_bytes() {
            return Err(ThumbError::StateNameMismatch {
                expected: STATE_NAME,
                found: String::from_utf8_lossy(name).into_owned(),
            });
        }
        let registers = take::<6>(bytes, name_end)?;
        let cycle = take::<4>(bytes, name_end + 6)?;
        Ok(Self {
            registers,
            last_register_set_cycle: i32::from_le_bytes(cycle),
        })
    }
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> ThumbResult<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(ThumbError::TruncatedState {
            needed: offset + N,
            got: bytes.len(),
        })
}

pub struct Sound<S: SoundChip> {
    chip: S,
    queue: VecDeque<RegWrite>,
    last_register_set_cycle: i32,
    volume: u8,
}

impl<S: SoundChip> Sound<S> {
    pub fn new(chip: S) -> Self {
        Self {
            chip,
            queue: VecDeque::new(),
            last_register_set_cycle: 0,
            volume: 100,
        }
    }

    pub fn chip(&self) -> &S {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut S {
        &mut self.chip
    }

    pub fn last_register_set_cycle(&self) -> i32 {
        self.last_register_set_cycle
    }

    pub fn pending_writes(&self) -> usize {
        self.queue.len()
    }

    /// Total queued time in seconds.
    pub fn queue_duration(&self) -> f64 {
        self.queue.iter().map(|w| w.delta).sum()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Percent in 0..=100; anything else is ignored.
    pub fn set_volume(&mut self, percent: i32) {
        if let Ok(percent @ 0..=100) = u8::try_from(percent) {
            self.volume = percent;
            self.chip.set_volume(percent);
        }
    }

    /// Step the volume by 2% in `direction` (-1 or 1), staying within 0..=100.
    pub fn adjust_volume(&mut self, direction: i8) {
        let step = match direction {
            -1 => -2,
            1 => 2,
            _ => 0,
        };
        self.set_volume(i32::from(self.volume) + step);
    }

    pub fn reset(&mut self) {
        self.last_register_set_cycle = 0;
        self.chip.reset();
        self.queue.clear();
    }

    pub fn adjust_cycle_counter(&mut self, amount: i32) {
        self.last_register_set_cycle = self.last_register_set_cycle.wrapping_add(amount);
    }

    /// Queue a register write stamped with the emulated CPU cycle.
    pub fn set(&mut self, addr: u16, value: u8, cycle: i32) {
        let elapsed = f64::from(cycle) - f64::from(self.last_register_set_cycle);
        self.queue.push_back(RegWrite {
            addr,
            value,
            delta: elapsed / CPU_CLOCK_HZ,
        });
        self.last_register_set_cycle = cycle;
    }

    /// Fill `length` stereo frames of `stream`, applying queued writes at
    /// their scheduled offsets.
    pub fn render_into(&mut self, stream: &mut [i16], length: usize) {
        let rate = f64::from(OUTPUT_FREQUENCY);

        // Drop queued time that can no longer fit in this fragment.
        let excess = self.queue_duration() - length as f64 / rate;
        if excess > 0.0 {
            let mut removed = 0.0;
            while removed < excess {
                let Some(write) = self.queue.pop_front() else {
                    break;
                };
                removed += write.delta;
                self.chip.set(write.addr, write.value);
            }
            tracing::debug!(
                "Flushed {:.4}s of queued sound writes ({} left)",
                removed,
                self.queue.len()
            );
        }

        let mut position = 0.0f64;
        let mut remaining = length as f64;
        while remaining > 0.0 {
            let Some(&write) = self.queue.front() else {
                let start = position as usize;
                self.process(stream, start, length.saturating_sub(start));
                // The overrun is not carried into the next write's delta.
                self.last_register_set_cycle = 0;
                break;
            };

            let duration = remaining / rate;
            if write.delta <= duration {
                if write.delta > 0.0 {
                    let samples = rate * write.delta;
                    // Round on absolute positions so consecutive runs tile.
                    let frames = ((position + samples) as usize).saturating_sub(position as usize);
                    self.process(stream, position as usize, frames);
                    position += samples;
                    remaining -= samples;
                }
                self.chip.set(write.addr, write.value);
                self.queue.pop_front();
            } else {
                let start = position as usize;
                self.process(stream, start, length.saturating_sub(start));
                if let Some(front) = self.queue.front_mut() {
                    front.delta -= duration;
                }
                break;
            }
        }
    }

    fn process(&mut self, stream: &mut [i16], start_frame: usize, frames: usize) {
        let start = start_frame.saturating_mul(CHANNELS).min(stream.len());
        let end = start
            .saturating_add(frames.saturating_mul(CHANNELS))
            .min(stream.len());
        self.chip
            .process(&mut stream[start..end], (end - start) / CHANNELS);
    }

    pub fn save_state(&self) -> SoundState {
        SoundState {
            registers: SOUND_REGISTERS.map(|addr| self.chip.get(addr)),
            last_register_set_cycle: self.last_register_set_cycle,
        }
    }

    /// Restore registers and the cycle counter. Pending writes are dropped.
    pub fn load_state(&mut self, state: &SoundState) {
        self.last_register_set_cycle = state.last_register_set_cycle;
        self.queue.clear();
        for (addr, value) in SOUND_REGISTERS.iter().zip(state.registers) {
            self.chip.set(*addr, value);
        }
    }
}
