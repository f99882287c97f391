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

use thiserror::Error;

/// Why a batch transfer did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The retry budget ran out on some step, or the peer never showed up.
    #[error("timed out waiting for peer")]
    Timeout,

    /// The peer sent CAN.
    #[error("transfer cancelled by peer")]
    Cancelled,

    /// A transport or file capability failed outright.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name for header block: {0:?}")]
    InvalidName(String),

    #[error("{name}: source ended with {remaining} bytes still to send")]
    UnexpectedEof { name: String, remaining: u64 },
}

/// Terminal result of a state machine run, before it is mapped to
/// `Result<(), TransferError>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Complete,
    Timeout,
    Cancelled,
}

impl Ending {
    pub fn into_result(self) -> Result<(), TransferError> {
        match self {
            Ending::Complete => Ok(()),
            Ending::Timeout => Err(TransferError::Timeout),
            Ending::Cancelled => Err(TransferError::Cancelled),
        }
    }
}
