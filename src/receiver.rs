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

use crate::config::UnknownFile;
use crate::error::{Ending, TransferError};
use crate::file::IncomingFile;
use crate::modem::Modem;
use crate::packet::{block_matches, crc_matches, decode_header, BlockSize, FileHeader, FrameStart, HeaderBlock};
use crate::protocol::*;

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Ask for a header block.
    Start,
    /// Waiting for the header block.
    Filename,
    /// Taking data blocks for the bound file.
    Data,
    /// All bytes in; waiting for EOT.
    FileDone,
    Canceled,
    End(Ending),
}

/// What the current state observed on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The start request went out.
    Requested,
    /// Header with an empty name.
    BatchEnd,
    /// Header bound to a manifest entry (or accepted for skipping).
    FileAccepted,
    /// Header named nothing in the manifest, or a size nothing can hold,
    /// and the batch stops here.
    FileRefused,
    /// A data block was taken; `complete` once nothing more is owed.
    Block { complete: bool },
    EndOfFile,
    /// Bad frame, unexpected byte or silence.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStep {
    Keep,
    Reset,
    Advance,
}

/// Outcome of one transition: where to go and what to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ReceiveState,
    pub reply: &'static [u8],
    pub retries_left: u8,
    pub block: BlockStep,
}

/// Pure transition function for the receive side.
pub fn transition(state: ReceiveState, event: Event, retries_left: u8, budget: u8) -> Transition {
    use ReceiveState::*;

    let success = |next: ReceiveState, reply: &'static [u8]| Transition {
        next,
        reply,
        retries_left: budget,
        block: BlockStep::Advance,
    };
    let failure = |retry_state: ReceiveState| {
        let left = retries_left.saturating_sub(1);
        Transition {
            next: if left == 0 { End(Ending::Timeout) } else { retry_state },
            reply: &[NAK],
            retries_left: left,
            block: BlockStep::Keep,
        }
    };
    let hold = |next: ReceiveState| Transition { next, reply: &[], retries_left, block: BlockStep::Keep };

    match (state, event) {
        (Start, _) => Transition {
            next: Filename,
            reply: &[CRC_REQUEST],
            retries_left,
            block: BlockStep::Reset,
        },

        (Filename, Event::BatchEnd) => success(End(Ending::Complete), &[ACK]),
        (Filename, Event::FileRefused) => success(End(Ending::Complete), &[ACK]),
        (Filename, Event::FileAccepted) => success(Data, &[ACK, CRC_REQUEST]),
        (Filename, Event::Failed) => failure(Start),

        (Data, Event::Block { complete: false }) => success(Data, &[ACK]),
        (Data, Event::Block { complete: true }) => success(FileDone, &[ACK]),
        (Data, Event::EndOfFile) => success(Start, &[ACK]),
        (Data, Event::Failed) => failure(Data),

        (FileDone, Event::EndOfFile) => success(Start, &[ACK]),
        (FileDone, Event::Failed) => failure(FileDone),

        (Filename | Data | FileDone, Event::Cancelled) => hold(Canceled),
        (Canceled, _) => hold(End(Ending::Cancelled)),
        (End(ending), _) => hold(End(ending)),

        // Events a state never produces leave it where it is.
        (state, _) => hold(state),
    }
}

// ============================================================================
// FSM Structure
// ============================================================================

/// Where accepted data goes.
enum Target {
    None,
    /// Index into the manifest; the entry's `size` is the byte count still owed.
    File(usize),
    /// Unknown file being skipped, with the bytes still owed.
    Discard(u64),
}

/// Result of reading one frame off the line.
enum Reception {
    Packet(BlockSize),
    /// EOT where a frame was expected; left undrained for the caller.
    EndOfTransmission,
    Corrupt,
    TimedOut,
    Cancelled,
}

pub(crate) struct Receiver<'m, 'a> {
    modem: &'m mut Modem,
    manifest: &'m mut [IncomingFile<'a>],
    state: ReceiveState,
    block: u8,
    retries_left: u8,
    target: Target,
    buffer: [u8; LARGE_BLOCK],
}

impl<'m, 'a> Receiver<'m, 'a> {
    pub(crate) fn new(modem: &'m mut Modem, manifest: &'m mut [IncomingFile<'a>]) -> Self {
        let retries_left = modem.config().retry_budget();
        Receiver {
            modem,
            manifest,
            state: ReceiveState::Start,
            block: 0,
            retries_left,
            target: Target::None,
            buffer: [0; LARGE_BLOCK],
        }
    }

    pub(crate) fn run(mut self) -> Result<(), TransferError> {
        loop {
            if let ReceiveState::End(ending) = self.step()? {
                return ending.into_result();
            }
        }
    }

    /// Observe the line for the current state, then apply the transition.
    pub(crate) fn step(&mut self) -> Result<ReceiveState, TransferError> {
        let event = match self.state {
            ReceiveState::Start => Event::Requested,
            ReceiveState::Filename => self.on_header()?,
            ReceiveState::Data => self.on_data()?,
            ReceiveState::FileDone => self.on_file_end()?,
            ReceiveState::Canceled => Event::Cancelled,
            ReceiveState::End(_) => return Ok(self.state),
        };

        let budget = self.modem.config().retry_budget();
        let t = transition(self.state, event, self.retries_left, budget);

        if event == Event::Failed {
            log::warn!(
                "{:?}: block {} failed, {} attempts left",
                self.state, self.block, t.retries_left
            );
        }

        match t.block {
            BlockStep::Keep => {}
            BlockStep::Reset => self.block = 0,
            BlockStep::Advance => self.block = self.block.wrapping_add(1),
        }
        for &byte in t.reply {
            self.modem.send_control(byte)?;
        }
        self.retries_left = t.retries_left;
        self.state = t.next;
        Ok(self.state)
    }

    // ========================================================================
    // State observers
    // ========================================================================

    fn on_header(&mut self) -> Result<Event, TransferError> {
        Ok(match self.receive_packet()? {
            Reception::Packet(size) => match FileHeader::parse(&self.buffer[..size.payload_len()]) {
                HeaderBlock::EndOfBatch => {
                    log::info!("End of batch");
                    Event::BatchEnd
                }
                HeaderBlock::File(header) => self.bind(header)?,
                HeaderBlock::Oversized(name) => {
                    log::warn!("{} announces a size beyond any limit, ending batch", name);
                    Event::FileRefused
                }
            },
            Reception::EndOfTransmission => {
                self.modem.drain()?;
                Event::Failed
            }
            Reception::Corrupt | Reception::TimedOut => Event::Failed,
            Reception::Cancelled => Event::Cancelled,
        })
    }

    fn on_data(&mut self) -> Result<Event, TransferError> {
        Ok(match self.receive_packet()? {
            Reception::Packet(size) => Event::Block { complete: self.deliver(size.payload_len())? },
            // A sender may skip the data blocks of an empty file entirely.
            Reception::EndOfTransmission if self.owed() == 0 => {
                log::debug!("Received: EOT");
                self.finish_file();
                Event::EndOfFile
            }
            Reception::EndOfTransmission => {
                log::debug!("EOT with {} bytes still owed", self.owed());
                self.modem.drain()?;
                Event::Failed
            }
            Reception::Corrupt | Reception::TimedOut => Event::Failed,
            Reception::Cancelled => Event::Cancelled,
        })
    }

    fn on_file_end(&mut self) -> Result<Event, TransferError> {
        Ok(match self.modem.await_byte()? {
            Some(EOT) => {
                log::debug!("Received: EOT");
                self.finish_file();
                Event::EndOfFile
            }
            Some(CAN) => {
                self.modem.drain()?;
                Event::Cancelled
            }
            Some(other) => {
                log::debug!("Expected EOT, got 0x{:02X}", other);
                self.modem.drain()?;
                Event::Failed
            }
            None => Event::Failed,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Bytes the bound target is still waiting for.
    fn owed(&self) -> u64 {
        match self.target {
            Target::File(idx) => self.manifest[idx].size,
            Target::Discard(owed) => owed,
            Target::None => 0,
        }
    }

    fn finish_file(&mut self) {
        if let Target::File(idx) = self.target {
            log::info!("Received {}", self.manifest[idx].name);
        }
        self.target = Target::None;
    }

    /// Match a header against the manifest and pick the data target.
    fn bind(&mut self, header: FileHeader) -> Result<Event, TransferError> {
        let found = self
            .manifest
            .iter()
            .position(|f| f.name == header.name && header.size <= f.size);

        if let Some(idx) = found {
            let entry = &mut self.manifest[idx];
            log::info!("Receiving {} ({} bytes)", header.name, header.size);
            entry.sink.begin(header.size)?;
            entry.size = header.size;
            self.target = Target::File(idx);
            return Ok(Event::FileAccepted);
        }

        match self.modem.config().unknown_file {
            UnknownFile::EndBatch => {
                log::warn!("No manifest entry for {} ({} bytes), ending batch", header.name, header.size);
                Ok(Event::FileRefused)
            }
            UnknownFile::Skip => {
                log::warn!("No manifest entry for {} ({} bytes), skipping", header.name, header.size);
                self.target = Target::Discard(header.size);
                Ok(Event::FileAccepted)
            }
        }
    }

    /// Hand the first `len` buffered bytes, clamped to what is still owed,
    /// to the target. Returns true when the file is complete.
    fn deliver(&mut self, len: usize) -> Result<bool, TransferError> {
        match self.target {
            Target::File(idx) => {
                let entry = &mut self.manifest[idx];
                let take = (len as u64).min(entry.size) as usize;
                let written = entry.sink.write(&self.buffer[..take])? as u64;
                entry.size -= written.min(entry.size);
                Ok(entry.size == 0)
            }
            Target::Discard(owed) => {
                let left = owed - (len as u64).min(owed);
                self.target = Target::Discard(left);
                Ok(left == 0)
            }
            Target::None => unreachable!("data block with no file bound"),
        }
    }

    /// Read one frame at the expected block number into `buffer`.
    fn receive_packet(&mut self) -> Result<Reception, TransferError> {
        let mut control = [0u8; 1];
        if !self.modem.await_bytes(&mut control)? {
            return Ok(Reception::TimedOut);
        }

        let size = match decode_header(control[0]) {
            FrameStart::Block(size) => size,
            FrameStart::Cancel => {
                log::debug!("Received: CAN");
                self.modem.drain()?;
                return Ok(Reception::Cancelled);
            }
            FrameStart::Unrecognized(EOT) => return Ok(Reception::EndOfTransmission),
            FrameStart::Unrecognized(byte) => {
                log::debug!("Unrecognized control byte 0x{:02X}", byte);
                self.modem.drain()?;
                return Ok(Reception::TimedOut);
            }
        };

        let mut numbers = [0u8; 2];
        if !self.modem.await_bytes(&mut numbers)? {
            return Ok(Reception::TimedOut);
        }
        let check = self.modem.config().block_check;
        if !block_matches(check, self.block, numbers[0], numbers[1]) {
            log::debug!(
                "Block number 0x{:02X}/0x{:02X}, expected 0x{:02X}",
                numbers[0], numbers[1], self.block
            );
            self.modem.drain()?;
            return Ok(Reception::Corrupt);
        }

        let len = size.payload_len();
        if !self.modem.await_bytes(&mut self.buffer[..len])? {
            return Ok(Reception::TimedOut);
        }

        let mut crc = [0u8; 2];
        if !self.modem.await_bytes(&mut crc)? {
            return Ok(Reception::TimedOut);
        }
        if !crc_matches(&self.buffer[..len], crc) {
            log::debug!("CRC mismatch on block {}", self.block);
            self.modem.drain()?;
            return Ok(Reception::Corrupt);
        }

        log::debug!("Received: block {} ({} bytes)", self.block, len);
        Ok(Reception::Packet(size))
    }
}

// ============================================================================
// Tests
// ============================================================================
