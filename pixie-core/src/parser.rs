#![allow(clippy::unusual_byte_groupings)]
//! Low-level parsing of Pixie-16 list-mode header words.
//!
//! This module provides functions to extract fields from the four mandatory
//! record header words, and the inverse packing used to synthesize records.

use crate::types::HeaderLayout;

/// Fill word found between module buffers.
pub const FILL_WORD: u32 = 0xFFFF_FFFF;

/// Module number marking the end of a spill.
pub const END_OF_SPILL_VSN: u32 = 9999;

/// Words in a module buffer header (length, module number).
pub const BUFFER_HEADER_WORDS: usize = 2;

/// Words in the smallest record header.
pub const MIN_HEADER_WORDS: usize = 4;

/// Largest event length word 0 can carry (14 bits).
pub const MAX_EVENT_LENGTH: u32 = 0x3FFF;

/// Largest trace length word 3 can carry (15 bits).
pub const MAX_TRACE_LENGTH: u32 = 0x7FFF;

// ============================================================================
// Header word 0
// Bits: [31] pileup | [30:17] event length | [16:12] header length |
//       [11:8] crate | [7:4] slot | [3:0] channel
// ============================================================================

/// Extracts the channel number from header word 0.
#[inline]
pub fn channel(word0: u32) -> u16 {
    (word0 & 0xF) as u16 // bits 3:0
}

/// Extracts the slot number from header word 0.
#[inline]
pub fn slot(word0: u32) -> u8 {
    ((word0 >> 4) & 0xF) as u8 // bits 7:4
}

/// Extracts the crate number from header word 0.
#[inline]
pub fn crate_id(word0: u32) -> u8 {
    ((word0 >> 8) & 0xF) as u8 // bits 11:8
}

/// Extracts the header length (words) from header word 0.
#[inline]
pub fn header_length(word0: u32) -> u32 {
    (word0 >> 12) & 0x1F // bits 16:12
}

/// Extracts the event length (words, header plus trace) from header word 0.
#[inline]
pub fn event_length(word0: u32) -> u32 {
    (word0 >> 17) & 0x3FFF // bits 30:17
}

/// Extracts the pile-up flag from header word 0.
#[inline]
pub fn pileup(word0: u32) -> bool {
    (word0 >> 31) & 0x1 != 0
}

// ============================================================================
// Header words 1 and 2
// Word 1: [31:0] event time low
// Word 2: [31:16] CFD fractional time | [15:0] event time high
// ============================================================================

/// Builds the 48-bit timestamp from header words 1 and 2.
#[inline]
pub fn timestamp(word1: u32, word2: u32) -> u64 {
    (((word2 & 0xFFFF) as u64) << 32) | word1 as u64
}

/// Extracts the CFD fractional time from header word 2.
#[inline]
pub fn cfd_time(word2: u32) -> u16 {
    (word2 >> 16) as u16
}

// ============================================================================
// Header word 3
// Bits: [31] trace out-of-range | [30:16] trace length | [15:0] energy
// ============================================================================

/// Extracts the energy from header word 3.
#[inline]
pub fn energy(word3: u32) -> u16 {
    (word3 & 0xFFFF) as u16
}

/// Extracts the trace length (samples) from header word 3.
#[inline]
pub fn trace_length(word3: u32) -> u32 {
    (word3 >> 16) & 0x7FFF // bits 30:16
}

/// Extracts the trace out-of-range flag from header word 3.
#[inline]
pub fn trace_out_of_range(word3: u32) -> bool {
    (word3 >> 31) & 0x1 != 0
}

/// Number of 32-bit words occupied by a trace of `samples` 16-bit samples.
#[inline]
pub fn trace_words(samples: u32) -> usize {
    (samples as usize + 1) / 2
}

/// Unpacks trace words into samples, low half first.
pub fn unpack_trace(words: &[u32], samples: usize) -> Vec<u16> {
    let mut trace = Vec::with_capacity(samples);
    for &word in words {
        trace.push((word & 0xFFFF) as u16);
        trace.push((word >> 16) as u16);
    }
    trace.truncate(samples);
    trace
}

/// Packs samples two per word, low half first.
pub fn pack_trace(samples: &[u16], out: &mut Vec<u32>) {
    for pair in samples.chunks(2) {
        let low = pair[0] as u32;
        let high = pair.get(1).copied().unwrap_or(0) as u32;
        out.push(low | (high << 16));
    }
}

/// Packs header word 0.
#[inline]
pub fn pack_word0(
    channel: u16,
    slot: u8,
    crate_id: u8,
    header_length: u32,
    event_length: u32,
    pileup: bool,
) -> u32 {
    (channel as u32 & 0xF)
        | ((slot as u32 & 0xF) << 4)
        | ((crate_id as u32 & 0xF) << 8)
        | ((header_length & 0x1F) << 12)
        | ((event_length & 0x3FFF) << 17)
        | ((pileup as u32) << 31)
}

/// Packs header words 1 and 2.
#[inline]
pub fn pack_time(timestamp: u64, cfd_time: u16) -> (u32, u32) {
    let low = (timestamp & 0xFFFF_FFFF) as u32;
    let high = ((timestamp >> 32) & 0xFFFF) as u32 | ((cfd_time as u32) << 16);
    (low, high)
}

/// Packs header word 3.
#[inline]
pub fn pack_word3(energy: u16, trace_length: u32, out_of_range: bool) -> u32 {
    energy as u32 | ((trace_length & 0x7FFF) << 16) | ((out_of_range as u32) << 31)
}

/// Parses the header layout from header word 0.
#[inline]
pub fn parse_layout(word0: u32) -> Option<HeaderLayout> {
    HeaderLayout::from_length(header_length(word0))
}
