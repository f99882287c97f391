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

use std::time::Duration;
use crate::protocol::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};

/// How the receiver validates the block number / complement pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockCheck {
    /// Reject the frame if either byte is wrong.
    #[default]
    Strict,
    /// Reject the frame only if both bytes are wrong. Matches older
    /// receivers that accept a frame with one damaged sequence byte.
    Lenient,
}

/// What the receiver does with a header naming a file it was not asked for
/// (or one larger than the manifest allows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFile {
    /// Acknowledge the header and end the batch successfully.
    #[default]
    EndBatch,
    /// Acknowledge the header, take the file's data and drop it.
    Skip,
}

/// Tunables shared by both transfer directions.
#[derive(Debug, Clone)]
pub struct Config {
    /// Attempts per sub-step; exhausting them ends the transfer with a timeout.
    pub retries: u8,
    /// Deadline for each bounded read.
    pub timeout: Duration,
    pub block_check: BlockCheck,
    pub unknown_file: UnknownFile,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            block_check: BlockCheck::default(),
            unknown_file: UnknownFile::default(),
        }
    }
}

impl Config {
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_block_check(mut self, block_check: BlockCheck) -> Self {
        self.block_check = block_check;
        self
    }

    pub fn with_unknown_file(mut self, unknown_file: UnknownFile) -> Self {
        self.unknown_file = unknown_file;
        self
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis().min(u64::MAX as u128) as u64
    }

    /// Retry budget as a starting count, never zero.
    pub(crate) fn retry_budget(&self) -> u8 {
        self.retries.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retries, 10);
        assert_eq!(config.timeout_ms(), 1000);
        assert_eq!(config.block_check, BlockCheck::Strict);
        assert_eq!(config.unknown_file, UnknownFile::EndBatch);
    }

    #[test]
    fn test_zero_retries_still_allows_one_attempt() {
        let config = Config::default().with_retries(0);
        assert_eq!(config.retry_budget(), 1);

        let mut config = Config::default();
        config.retries = 0;
        assert_eq!(config.retry_budget(), 1);
    }
}
