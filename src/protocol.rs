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

//! YMODEM protocol constants

/// Start of header - begins a 128-byte block
pub const SOH: u8 = 0x01;

/// Start of text - begins a 1024-byte block
pub const STX: u8 = 0x02;

/// End of transmission - sender has no more data for the current file
pub const EOT: u8 = 0x04;

/// Acknowledge - block accepted, continue
pub const ACK: u8 = 0x06;

/// Negative acknowledge - block rejected, retransmit
pub const NAK: u8 = 0x15;

/// Cancel - peer aborts the whole batch
pub const CAN: u8 = 0x18;

/// Start request - receiver is ready, CRC-16 mode
pub const CRC_REQUEST: u8 = b'C';

/// Padding for the unused tail of a data block
pub const CPMEOF: u8 = 0x1A;

/// Payload length of an SOH block
pub const SMALL_BLOCK: usize = 128;

/// Payload length of an STX block
pub const LARGE_BLOCK: usize = 1024;

/// Control byte + block number + complement
pub const FRAME_HEADER_LEN: usize = 3;

/// Two CRC bytes, most significant first
pub const FRAME_CRC_LEN: usize = 2;

/// Attempts per sub-step before a transfer gives up
pub const DEFAULT_RETRIES: u8 = 10;

/// Per-operation wait, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Printable name for a control byte, used in log output
pub fn control_name(byte: u8) -> &'static str {
    match byte {
        SOH => "SOH",
        STX => "STX",
        EOT => "EOT",
        ACK => "ACK",
        NAK => "NAK",
        CAN => "CAN",
        CRC_REQUEST => "'C'",
        _ => "?",
    }
}
