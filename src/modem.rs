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

use crate::config::Config;
use crate::error::TransferError;
use crate::file::{IncomingFile, OutgoingFile};
use crate::packet::FileHeader;
use crate::protocol::{control_name, LARGE_BLOCK};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::serial::{Clock, Transport};

/// One link to a peer. Each `receive` or `transmit` call runs a complete
/// batch and owns its own buffers; nothing is shared between calls.
pub struct Modem {
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    config: Config,
}

impl Modem {
    pub fn new(transport: Box<dyn Transport>, clock: Box<dyn Clock>, config: Config) -> Self {
        Modem { transport, clock, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receive a batch into the matching manifest entries.
    pub fn receive(&mut self, manifest: &mut [IncomingFile<'_>]) -> Result<(), TransferError> {
        Receiver::new(self, manifest).run()
    }

    /// Send `files` in order, then close the batch.
    pub fn transmit(&mut self, files: &mut [OutgoingFile<'_>]) -> Result<(), TransferError> {
        if let Some(bad) = files.iter().find(|f| header_of(f).to_payload().is_none()) {
            return Err(TransferError::InvalidName(bad.name.clone()));
        }
        Sender::new(self, files).run()
    }

    // ========================================================================
    // Line primitives
    // ========================================================================

    /// Accumulate exactly `buf.len()` bytes, polling until the configured
    /// timeout has passed since the call started. Returns false on timeout;
    /// whatever did arrive is left in `buf`.
    pub(crate) fn await_bytes(&mut self, buf: &mut [u8]) -> Result<bool, TransferError> {
        let timeout = self.config.timeout_ms();
        let start = self.clock.now_ms();
        let mut received = 0;

        loop {
            received += self.poll(&mut buf[received..])?;
            let elapsed = self.clock.now_ms().saturating_sub(start);
            if received == buf.len() || elapsed >= timeout {
                break;
            }
        }

        Ok(received == buf.len())
    }

    /// First byte to arrive within the timeout.
    pub(crate) fn await_byte(&mut self) -> Result<Option<u8>, TransferError> {
        let mut byte = [0u8; 1];
        if self.await_bytes(&mut byte)? {
            log::trace!("Received: {} (0x{:02X})", control_name(byte[0]), byte[0]);
            Ok(Some(byte[0]))
        } else {
            Ok(None)
        }
    }

    /// Discard input until `wanted` shows up or the timeout passes.
    pub(crate) fn await_specific(&mut self, wanted: u8) -> Result<bool, TransferError> {
        let timeout = self.config.timeout_ms();
        let start = self.clock.now_ms();
        let mut byte = [0u8; 1];

        loop {
            if self.poll(&mut byte)? == 1 {
                if byte[0] == wanted {
                    return Ok(true);
                }
                log::trace!("Skipping 0x{:02X} while waiting for {}", byte[0], control_name(wanted));
            }
            if self.clock.now_ms().saturating_sub(start) >= timeout {
                return Ok(false);
            }
        }
    }

    /// Throw away up to a full block of input so a damaged frame cannot
    /// bleed into the next parse.
    pub(crate) fn drain(&mut self) -> Result<(), TransferError> {
        let mut scratch = [0u8; LARGE_BLOCK];
        self.await_bytes(&mut scratch)?;
        Ok(())
    }

    pub(crate) fn send_control(&mut self, byte: u8) -> Result<(), TransferError> {
        log::debug!("Sent: {}", control_name(byte));
        self.send(&[byte])
    }

    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        self.transport.write_all(bytes)?;
        Ok(())
    }

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.transport.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ) => Ok(0),
            Err(e) => Err(TransferError::Io(e)),
        }
    }
}

pub(crate) fn header_of(file: &OutgoingFile<'_>) -> FileHeader {
    FileHeader { name: file.name.clone(), size: file.size }
}

// ============================================================================
// Tests
// ============================================================================
