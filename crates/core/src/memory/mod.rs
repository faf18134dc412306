// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Memory image layout shared by the bus and the hosts that own the buffers.
//!
//! The interpreter never allocates ROM or RAM. Hosts hand in half-word
//! slices; these helpers build them from little-endian cartridge images.

/// Byte-address mask for the ROM region (15 bits).
pub const ROM_ADDR_MASK: u32 = 0x7FFF;
/// Byte-address mask for the RAM region (13 bits).
pub const RAM_ADDR_MASK: u32 = 0x1FFF;

/// Addressable ROM size in bytes.
pub const ROM_SIZE: usize = ROM_ADDR_MASK as usize + 1;
/// Addressable RAM size in bytes.
pub const RAM_SIZE: usize = RAM_ADDR_MASK as usize + 1;

/// Half-words reachable through the ROM mask.
pub const ROM_WORDS: usize = ROM_SIZE / 2;
/// Half-words reachable through the RAM mask.
pub const RAM_WORDS: usize = RAM_SIZE / 2;

/// Decode a little-endian byte image into half-words.
///
/// A trailing odd byte becomes the low half of a final word. The values are
/// numeric, so the result is the same on little- and big-endian hosts.
pub fn words_from_le_bytes(bytes: &[u8]) -> Vec<u16> {
    let mut chunks = bytes.chunks_exact(2);
    let mut words: Vec<u16> = chunks
        .by_ref()
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if let [last] = chunks.remainder() {
        words.push(u16::from(*last));
    }
    words
}

/// Encode half-words back into a little-endian byte image.
pub fn words_to_le_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Build a half-word buffer of exactly `len` words from a byte image,
/// zero-padding or truncating as needed.
pub fn image_words(bytes: &[u8], len: usize) -> Vec<u16> {
    let mut words = words_from_le_bytes(bytes);
    if words.len() > len {
        tracing::warn!(
            "Image of {} bytes exceeds {} addressable half-words; truncating",
            bytes.len(),
            len
        );
    }
    words.resize(len, 0);
    words
}
