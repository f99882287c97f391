// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! YMODEM frame codec.
//!
//! ```text
//! [control][block][!block][payload: 128 | 1024][crc hi][crc lo]
//! ```
//!
//! The CRC covers the payload only. Nothing here touches the line; the
//! receiver reads a frame piecewise and uses the same helpers to judge it.

use thiserror::Error;
use crate::config::BlockCheck;
use crate::crc::crc16;
use crate::protocol::*;

/// Payload size of a block, selected by its control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSize {
    /// SOH, 128 bytes
    Small,
    /// STX, 1024 bytes
    Large,
}

impl BlockSize {
    pub fn payload_len(self) -> usize {
        match self {
            BlockSize::Small => SMALL_BLOCK,
            BlockSize::Large => LARGE_BLOCK,
        }
    }

    pub fn control(self) -> u8 {
        match self {
            BlockSize::Small => SOH,
            BlockSize::Large => STX,
        }
    }

    /// Smallest block that holds `len` bytes.
    pub fn fitting(len: usize) -> BlockSize {
        if len > SMALL_BLOCK {
            BlockSize::Large
        } else {
            BlockSize::Small
        }
    }
}

/// Meaning of the first byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStart {
    Block(BlockSize),
    Cancel,
    Unrecognized(u8),
}

pub fn decode_header(control: u8) -> FrameStart {
    match control {
        SOH => FrameStart::Block(BlockSize::Small),
        STX => FrameStart::Block(BlockSize::Large),
        CAN => FrameStart::Cancel,
        other => FrameStart::Unrecognized(other),
    }
}

/// Build a complete frame. A short payload is zero-padded to the block size;
/// a long one is truncated.
pub fn encode(size: BlockSize, block: u8, payload: &[u8]) -> Vec<u8> {
    let len = size.payload_len();
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + len + FRAME_CRC_LEN);
    frame.push(size.control());
    frame.push(block);
    frame.push(!block);

    let take = payload.len().min(len);
    frame.extend_from_slice(&payload[..take]);
    frame.resize(FRAME_HEADER_LEN + len, 0);

    let crc = crc16(&frame[FRAME_HEADER_LEN..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// Whether a received block number pair is acceptable for `expected`.
pub fn block_matches(check: BlockCheck, expected: u8, number: u8, complement: u8) -> bool {
    let number_ok = number == expected;
    let complement_ok = complement == !expected;
    match check {
        BlockCheck::Strict => number_ok && complement_ok,
        BlockCheck::Lenient => number_ok || complement_ok,
    }
}

/// Compare the CRC of `payload` against the two wire bytes.
pub fn crc_matches(payload: &[u8], wire: [u8; 2]) -> bool {
    crc16(payload) == u16::from_be_bytes(wire)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame starts with CAN")]
    Cancel,
    #[error("unrecognized control byte 0x{0:02X}")]
    Unrecognized(u8),
    #[error("frame truncated: {got} of {need} bytes")]
    Truncated { got: usize, need: usize },
    #[error("block number 0x{number:02X} does not match complement 0x{complement:02X}")]
    BadComplement { number: u8, complement: u8 },
    #[error("CRC mismatch: received 0x{received:04X}, computed 0x{computed:04X}")]
    BadCrc { received: u16, computed: u16 },
}

/// A frame that passed its complement and CRC checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub size: BlockSize,
    pub block: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Parse a whole frame held in memory.
    pub fn decode(frame: &[u8]) -> Result<Packet, FrameError> {
        let control = *frame.first().ok_or(FrameError::Truncated { got: 0, need: 1 })?;
        let size = match decode_header(control) {
            FrameStart::Block(size) => size,
            FrameStart::Cancel => return Err(FrameError::Cancel),
            FrameStart::Unrecognized(byte) => return Err(FrameError::Unrecognized(byte)),
        };

        let need = FRAME_HEADER_LEN + size.payload_len() + FRAME_CRC_LEN;
        if frame.len() < need {
            return Err(FrameError::Truncated { got: frame.len(), need });
        }

        let (number, complement) = (frame[1], frame[2]);
        if complement != !number {
            return Err(FrameError::BadComplement { number, complement });
        }

        let payload = &frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + size.payload_len()];
        let received = u16::from_be_bytes([frame[need - 2], frame[need - 1]]);
        let computed = crc16(payload);
        if received != computed {
            return Err(FrameError::BadCrc { received, computed });
        }

        Ok(Packet { size, block: number, payload: payload.to_vec() })
    }
}

// ============================================================================
// Header block (block 0)
// ============================================================================

/// What a block 0 payload announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBlock {
    /// Empty name: no more files.
    EndOfBatch,
    File(FileHeader),
    /// The size field does not fit in 64 bits; no ceiling can hold it.
    Oversized(String),
}

/// Name and size announced in a header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub size: u64,
}

impl FileHeader {
    /// Lay out `name\0<size>` and pick the block size that holds it.
    /// Returns `None` when the name cannot be carried in a header block.
    pub fn to_payload(&self) -> Option<(BlockSize, Vec<u8>)> {
        let name = self.name.as_bytes();
        if name.is_empty() || name.contains(&0) {
            return None;
        }

        let mut payload = Vec::with_capacity(SMALL_BLOCK);
        payload.extend_from_slice(name);
        payload.push(0);
        payload.extend_from_slice(self.size.to_string().as_bytes());

        // Keep a terminator after the size string.
        if payload.len() >= LARGE_BLOCK {
            return None;
        }
        let size = if payload.len() < SMALL_BLOCK { BlockSize::Small } else { BlockSize::Large };
        payload.resize(size.payload_len(), 0);
        Some((size, payload))
    }

    /// Read a header payload.
    pub fn parse(payload: &[u8]) -> HeaderBlock {
        let name_end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        if name_end == 0 {
            return HeaderBlock::EndOfBatch;
        }

        let name = String::from_utf8_lossy(&payload[..name_end]).into_owned();
        let rest = payload.get(name_end + 1..).unwrap_or(&[]);
        match parse_decimal(rest) {
            Some(size) => HeaderBlock::File(FileHeader { name, size }),
            None => HeaderBlock::Oversized(name),
        }
    }
}

/// Leading decimal digits after optional spaces; no digits reads as 0.
/// `None` on overflow.
fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    bytes
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|b| b.is_ascii_digit())
        .try_fold(0u64, |acc, &b| acc.checked_mul(10)?.checked_add((b - b'0') as u64))
}

/// The all-zero header that closes a batch.
pub fn end_of_batch_payload() -> [u8; SMALL_BLOCK] {
    [0; SMALL_BLOCK]
}
