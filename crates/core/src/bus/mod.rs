// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::{RAM_ADDR_MASK, ROM_ADDR_MASK};
use crate::metrics::AccessCounters;

/// Memory accelerator mode control register, the only mapped peripheral.
pub const MAMCR_ADDR: u32 = 0xE01F_C000;

/// Instruction fetches below this ROM offset read as zero.
pub const ROM_VECTOR_WINDOW: u32 = 0x50;

/// Address space regions, selected by the top nibble of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Rom,
    Ram,
    Peripheral,
    Halt,
    Debug,
    Unmapped,
}

impl Region {
    pub fn decode(addr: u32) -> Self {
        match addr >> 28 {
            0x0 => Region::Rom,
            0x4 => Region::Ram,
            0xD => Region::Debug,
            0xE => Region::Peripheral,
            0xF => Region::Halt,
            _ => Region::Unmapped,
        }
    }
}

/// Half-word addressed view of the cartridge ROM and the shared RAM.
///
/// Both buffers belong to the host. Indices are masked to the region size and
/// anything past the end of a short buffer reads as 0 and ignores writes, so
/// no access can fault.
pub struct AddressBus<'a> {
    rom: &'a [u16],
    ram: &'a mut [u16],
    mamcr: u32,
    counters: AccessCounters,
}

impl<'a> AddressBus<'a> {
    pub fn new(rom: &'a [u16], ram: &'a mut [u16]) -> Self {
        Self {
            rom,
            ram,
            mamcr: 0,
            counters: AccessCounters::default(),
        }
    }

    pub fn reset(&mut self) {
        self.mamcr = 0;
        self.counters.reset();
    }

    pub fn counters(&self) -> AccessCounters {
        self.counters
    }

    pub fn mamcr(&self) -> u32 {
        self.mamcr
    }

    pub fn ram(&self) -> &[u16] {
        self.ram
    }

    fn rom_word(&self, addr: u32) -> u16 {
        let index = ((addr & ROM_ADDR_MASK) >> 1) as usize;
        self.rom.get(index).copied().unwrap_or(0)
    }

    fn ram_word(&self, addr: u32) -> u16 {
        let index = ((addr & RAM_ADDR_MASK) >> 1) as usize;
        self.ram.get(index).copied().unwrap_or(0)
    }

    fn set_ram_word(&mut self, addr: u32, value: u16) {
        let index = ((addr & RAM_ADDR_MASK) >> 1) as usize;
        if let Some(word) = self.ram.get_mut(index) {
            *word = value;
        }
    }

    /// Fetch one instruction half-word.
    pub fn fetch16(&mut self, addr: u32) -> u16 {
        self.counters.fetches += 1;

        match Region::decode(addr) {
            Region::Rom => {
                if addr & ROM_ADDR_MASK < ROM_VECTOR_WINDOW {
                    return 0;
                }
                self.rom_word(addr)
            }
            Region::Ram => self.ram_word(addr),
            _ => 0,
        }
    }

    /// Fetch a word from the instruction stream. Within the ROM vector window
    /// only the first two words read through.
    pub fn fetch32(&mut self, addr: u32) -> u32 {
        match Region::decode(addr) {
            Region::Rom if addr < ROM_VECTOR_WINDOW => {
                let data = self.read32(addr);
                if addr == 0x0000_0000 || addr == 0x0000_0004 {
                    data
                } else {
                    0
                }
            }
            Region::Rom | Region::Ram => {
                let high = u32::from(self.fetch16(addr.wrapping_add(2)));
                let low = u32::from(self.fetch16(addr));
                (high << 16) | low
            }
            _ => 0,
        }
    }

    /// Read a half-word. MAMCR is returned at its full 32-bit width.
    pub fn read16(&mut self, addr: u32) -> u32 {
        if (addr > 0x4000_1FFF && addr < 0x5000_0000)
            || (addr > 0x0000_7FFF && addr < 0x1000_0000)
        {
            return 0;
        }
        if addr & 1 != 0 {
            return 0;
        }

        self.counters.reads += 1;

        match Region::decode(addr) {
            Region::Rom => u32::from(self.rom_word(addr)),
            Region::Ram => u32::from(self.ram_word(addr)),
            Region::Peripheral if addr == MAMCR_ADDR => self.mamcr,
            _ => 0,
        }
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        if addr & 3 != 0 {
            return 0;
        }

        match Region::decode(addr) {
            Region::Rom | Region::Ram => {
                let high = self.read16(addr.wrapping_add(2));
                let low = self.read16(addr);
                (high << 16) | low
            }
            _ => 0,
        }
    }

    /// Write a half-word. RAM keeps the low 16 bits; MAMCR keeps all 32.
    pub fn write16(&mut self, addr: u32, data: u32) {
        if (addr > 0x4000_1FFF && addr < 0x5000_0000)
            || (addr > 0x4000_0028 && addr < 0x4000_0C00)
        {
            return;
        }
        if addr & 1 != 0 {
            return;
        }

        self.counters.writes += 1;

        match Region::decode(addr) {
            Region::Ram => self.set_ram_word(addr, data as u16),
            Region::Peripheral if addr == MAMCR_ADDR => self.mamcr = data,
            _ => {}
        }
    }

    pub fn write32(&mut self, addr: u32, data: u32) {
        if addr & 3 != 0 {
            return;
        }

        match Region::decode(addr) {
            Region::Halt => {
                // TODO: surface halt-region writes as a stop once a cartridge needs it.
                tracing::trace!("Halt region write {:#010x} <- {:#010x}", addr, data);
            }
            Region::Debug => {
                tracing::trace!("Debug region write {:#010x} <- {:#010x}", addr, data);
            }
            Region::Ram => {
                self.write16(addr, data & 0xFFFF);
                self.write16(addr.wrapping_add(2), data >> 16);
            }
            _ => {}
        }
    }
}
