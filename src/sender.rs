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

use crate::error::{Ending, TransferError};
use crate::file::OutgoingFile;
use crate::modem::{header_of, Modem};
use crate::packet::{encode, end_of_batch_payload, BlockSize};
use crate::protocol::*;
use crate::receiver::BlockStep;

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    /// Waiting for the receiver's start request.
    Start,
    /// Sending a header block, or the empty one that closes the batch.
    Filename,
    Data,
    /// Sending EOT.
    FileDone,
    Canceled,
    End(Ending),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Start request seen.
    Ready,
    /// No start request before the timeout.
    NotReady,
    /// Receiver acknowledged; `remaining` is what is left of the current file.
    Ack { remaining: u64 },
    /// The closing header went out.
    BatchClosed,
    /// NAK, noise or silence.
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: TransmitState,
    pub retries_left: u8,
    pub block: BlockStep,
}

/// Pure transition function for the transmit side.
pub fn transition(state: TransmitState, event: Event, retries_left: u8, budget: u8) -> Transition {
    use TransmitState::*;

    let success = |next: TransmitState, block: BlockStep| Transition {
        next,
        retries_left: budget,
        block,
    };
    let hold = |next: TransmitState| Transition { next, retries_left, block: BlockStep::Keep };
    let retry = |state: TransmitState| {
        let left = retries_left.saturating_sub(1);
        Transition {
            next: if left == 0 { End(Ending::Timeout) } else { state },
            retries_left: left,
            block: BlockStep::Keep,
        }
    };

    match (state, event) {
        (Start, Event::Ready) => success(Filename, BlockStep::Reset),
        (Start, Event::NotReady) => retry(Start),

        (Filename, Event::Ack { .. }) => success(Data, BlockStep::Advance),
        (Filename, Event::BatchClosed) => hold(End(Ending::Complete)),
        (Data, Event::Ack { remaining: 0 }) => success(FileDone, BlockStep::Advance),
        (Data, Event::Ack { .. }) => success(Data, BlockStep::Advance),
        (FileDone, Event::Ack { .. }) => success(Start, BlockStep::Keep),

        (Filename | Data | FileDone, Event::Rejected) => retry(state),
        (Filename | Data | FileDone, Event::Cancelled) => hold(Canceled),
        (Canceled, _) => hold(End(Ending::Cancelled)),
        (End(ending), _) => hold(End(ending)),

        (state, _) => hold(state),
    }
}

// ============================================================================
// FSM Structure
// ============================================================================

pub(crate) struct Sender<'m, 'a> {
    modem: &'m mut Modem,
    files: &'m mut [OutgoingFile<'a>],
    state: TransmitState,
    block: u8,
    retries_left: u8,
    /// Index of the file being sent.
    current: usize,
    /// Bytes of the current file not yet acknowledged.
    remaining: u64,
    buffer: [u8; LARGE_BLOCK],
}

impl<'m, 'a> Sender<'m, 'a> {
    pub(crate) fn new(modem: &'m mut Modem, files: &'m mut [OutgoingFile<'a>]) -> Self {
        let retries_left = modem.config().retry_budget();
        Sender {
            modem,
            files,
            state: TransmitState::Start,
            block: 0,
            retries_left,
            current: 0,
            remaining: 0,
            buffer: [0; LARGE_BLOCK],
        }
    }

    pub(crate) fn run(mut self) -> Result<(), TransferError> {
        loop {
            if let TransmitState::End(ending) = self.step()? {
                return ending.into_result();
            }
        }
    }

    pub(crate) fn step(&mut self) -> Result<TransmitState, TransferError> {
        let event = match self.state {
            TransmitState::Start => self.on_start()?,
            TransmitState::Filename => self.on_filename()?,
            TransmitState::Data => self.on_data()?,
            TransmitState::FileDone => self.on_file_done()?,
            TransmitState::Canceled => Event::Cancelled,
            TransmitState::End(_) => return Ok(self.state),
        };

        let budget = self.modem.config().retry_budget();
        let t = transition(self.state, event, self.retries_left, budget);

        if matches!(event, Event::Rejected | Event::NotReady) {
            log::warn!("{:?}: no acknowledgement, {} attempts left", self.state, t.retries_left);
        }

        match t.block {
            BlockStep::Keep => {}
            BlockStep::Reset => self.block = 0,
            BlockStep::Advance => self.block = self.block.wrapping_add(1),
        }
        self.retries_left = t.retries_left;
        self.state = t.next;
        Ok(self.state)
    }

    // ========================================================================
    // State actions
    // ========================================================================

    fn on_start(&mut self) -> Result<Event, TransferError> {
        if self.modem.await_specific(CRC_REQUEST)? {
            log::debug!("Received: 'C'");
            Ok(Event::Ready)
        } else {
            log::info!("Receiver not ready");
            Ok(Event::NotReady)
        }
    }

    fn on_filename(&mut self) -> Result<Event, TransferError> {
        let Some(file) = self.files.get(self.current) else {
            let frame = encode(BlockSize::Small, self.block, &end_of_batch_payload());
            self.modem.send(&frame)?;
            log::debug!("Sent: end of batch");

            // Only a cancel changes the outcome once the batch is closed.
            return Ok(match self.modem.await_byte()? {
                Some(CAN) => Event::Cancelled,
                _ => Event::BatchClosed,
            });
        };

        let (size, payload) = header_of(file)
            .to_payload()
            .ok_or_else(|| TransferError::InvalidName(file.name.clone()))?;
        let frame = encode(size, self.block, &payload);
        log::info!("Sending {} ({} bytes)", file.name, file.size);
        let file_size = file.size;
        self.modem.send(&frame)?;

        let event = self.await_reply()?;
        if let Event::Ack { .. } = event {
            // The receiver follows its ACK with a start request for the data.
            self.modem.await_specific(CRC_REQUEST)?;
            self.remaining = file_size;
            return Ok(Event::Ack { remaining: file_size });
        }
        Ok(event)
    }

    fn on_data(&mut self) -> Result<Event, TransferError> {
        let file = &mut self.files[self.current];
        let offset = file.size - self.remaining;
        let want = self.remaining.min(LARGE_BLOCK as u64) as usize;

        let read = file.source.read_at(offset, &mut self.buffer[..want])?.min(want);
        if read == 0 && self.remaining > 0 {
            return Err(TransferError::UnexpectedEof {
                name: file.name.clone(),
                remaining: self.remaining,
            });
        }

        let size = BlockSize::fitting(read);
        self.buffer[read..size.payload_len()].fill(CPMEOF);
        let frame = encode(size, self.block, &self.buffer[..size.payload_len()]);
        self.modem.send(&frame)?;
        log::debug!("Sent: block {} ({} of {} bytes)", self.block, read, size.payload_len());

        let event = self.await_reply()?;
        if let Event::Ack { .. } = event {
            self.remaining -= read as u64;
            return Ok(Event::Ack { remaining: self.remaining });
        }
        Ok(event)
    }

    fn on_file_done(&mut self) -> Result<Event, TransferError> {
        self.modem.send_control(EOT)?;

        let event = self.await_reply()?;
        if let Event::Ack { .. } = event {
            log::info!("Sent {}", self.files[self.current].name);
            self.current += 1;
        }
        Ok(event)
    }

    /// Classify the receiver's answer to whatever was just sent.
    fn await_reply(&mut self) -> Result<Event, TransferError> {
        Ok(match self.modem.await_byte()? {
            Some(ACK) => {
                log::debug!("Received: ACK");
                Event::Ack { remaining: self.remaining }
            }
            Some(CAN) => {
                log::debug!("Received: CAN");
                Event::Cancelled
            }
            Some(other) => {
                log::debug!("Received: {} (0x{:02X})", control_name(other), other);
                Event::Rejected
            }
            None => Event::Rejected,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::file::FileSource;
    use crate::packet::FileHeader;
    use crate::serial::{ManualClock, MockSerialPort};
    use std::sync::atomic::Ordering;

    fn modem(config: Config, responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Modem {
        Modem::new(
            Box::new(MockSerialPort::new(responses, expected_writes)),
            Box::new(ManualClock::new(10)),
            config,
        )
    }

    fn header_frame(name: &str, size: u64) -> Vec<u8> {
        let (block_size, payload) = FileHeader { name: name.into(), size }.to_payload().unwrap();
        encode(block_size, 0, &payload)
    }

    fn data_frame(block: u8, data: &[u8]) -> Vec<u8> {
        let size = BlockSize::fitting(data.len());
        let mut payload = data.to_vec();
        payload.resize(size.payload_len(), CPMEOF);
        encode(size, block, &payload)
    }

    fn batch_end_frame() -> Vec<u8> {
        encode(BlockSize::Small, 0, &[0u8; 128])
    }

    /// Receiver side of one file sent in `blocks` data blocks.
    fn file_replies(responses: &mut Vec<Option<u8>>, blocks: usize) {
        responses.extend([Some(CRC_REQUEST), None, Some(ACK), Some(CRC_REQUEST)]);
        for _ in 0..blocks {
            responses.extend([None, Some(ACK)]);
        }
        responses.extend([None, Some(ACK)]);
    }

    fn batch_end_replies(responses: &mut Vec<Option<u8>>) {
        responses.extend([Some(CRC_REQUEST), None, Some(ACK)]);
    }

    #[test]
    fn test_sender_full_transfer() {
        let mut responses = Vec::new();
        file_replies(&mut responses, 1);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("a.txt", 5);
        expected_writes.extend(data_frame(1, b"HELLO"));
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        let mut source: &[u8] = b"HELLO";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("a.txt", 5, &mut source)];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_multiple_blocks() {
        let content: Vec<u8> = (0..1100).map(|i| (i % 256) as u8).collect();

        let mut responses = Vec::new();
        file_replies(&mut responses, 2);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("multi.bin", 1100);
        expected_writes.extend(data_frame(1, &content[..1024]));
        expected_writes.extend(data_frame(2, &content[1024..]));
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        assert_eq!(data_frame(1, &content[..1024])[0], STX);
        assert_eq!(data_frame(2, &content[1024..])[0], SOH);

        let mut source = content.clone();
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("multi.bin", 1100, &mut source)];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_nak_retry() {
        let mut responses = vec![Some(CRC_REQUEST), None, Some(ACK), Some(CRC_REQUEST)];
        responses.extend([None, Some(NAK), None, Some(ACK)]);
        responses.extend([None, Some(NAK), None, Some(ACK)]);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("retry.txt", 5);
        expected_writes.extend(data_frame(1, b"retry"));
        expected_writes.extend(data_frame(1, b"retry"));
        expected_writes.push(EOT);
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        let mut source: &[u8] = b"retry";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("retry.txt", 5, &mut source)];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_header_retry() {
        let mut responses = vec![Some(CRC_REQUEST), None, Some(NAK)];
        responses.extend([None, Some(ACK), Some(CRC_REQUEST)]);
        responses.extend([None, Some(ACK), None, Some(ACK)]);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("a.txt", 5);
        expected_writes.extend(header_frame("a.txt", 5));
        expected_writes.extend(data_frame(1, b"HELLO"));
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        let mut source: &[u8] = b"HELLO";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("a.txt", 5, &mut source)];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_receiver_never_ready() {
        let clock = ManualClock::new(10);
        let now = clock.handle();
        let mut modem = Modem::new(
            Box::new(MockSerialPort::new(vec![], vec![])),
            Box::new(clock),
            Config::default().with_retries(3),
        );

        let mut source: &[u8] = b"HELLO";
        let mut files = [OutgoingFile::new("a.txt", 5, &mut source)];

        assert!(matches!(modem.transmit(&mut files), Err(TransferError::Timeout)));

        let elapsed = now.load(Ordering::SeqCst);
        assert!(elapsed >= 3000, "gave up early: {} ms", elapsed);
        assert!(elapsed < 4000, "waited past the budget: {} ms", elapsed);
    }

    #[test]
    fn test_sender_data_retries_exhausted() {
        let mut responses = vec![Some(CRC_REQUEST), None, Some(ACK), Some(CRC_REQUEST)];
        responses.extend([None, Some(NAK), None, Some(NAK), None, Some(NAK)]);

        let mut expected_writes = header_frame("a.txt", 5);
        for _ in 0..3 {
            expected_writes.extend(data_frame(1, b"HELLO"));
        }

        let mut source: &[u8] = b"HELLO";
        let mut modem = modem(Config::default().with_retries(3), responses, expected_writes);
        let mut files = [OutgoingFile::new("a.txt", 5, &mut source)];

        assert!(matches!(modem.transmit(&mut files), Err(TransferError::Timeout)));
    }

    #[test]
    fn test_sender_cancelled() {
        let responses = vec![Some(CRC_REQUEST), None, Some(CAN)];
        let expected_writes = header_frame("a.txt", 5);

        let mut source: &[u8] = b"HELLO";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("a.txt", 5, &mut source)];

        assert!(matches!(modem.transmit(&mut files), Err(TransferError::Cancelled)));
    }

    #[test]
    fn test_sender_multiple_files() {
        let mut responses = Vec::new();
        file_replies(&mut responses, 1);
        file_replies(&mut responses, 1);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("first.txt", 5);
        expected_writes.extend(data_frame(1, b"first"));
        expected_writes.push(EOT);
        expected_writes.extend(header_frame("second.txt", 6));
        expected_writes.extend(data_frame(1, b"second"));
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        let mut first: &[u8] = b"first";
        let mut second: &[u8] = b"second";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [
            OutgoingFile::new("first.txt", 5, &mut first),
            OutgoingFile::new("second.txt", 6, &mut second),
        ];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_empty_file() {
        let mut responses = Vec::new();
        file_replies(&mut responses, 1);
        batch_end_replies(&mut responses);

        let mut expected_writes = header_frame("empty", 0);
        expected_writes.extend(data_frame(1, b""));
        expected_writes.push(EOT);
        expected_writes.extend(batch_end_frame());

        let mut source: &[u8] = b"";
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("empty", 0, &mut source)];

        modem.transmit(&mut files).expect("transfer should succeed");
    }

    #[test]
    fn test_sender_empty_batch() {
        let mut responses = Vec::new();
        batch_end_replies(&mut responses);

        let mut modem = modem(Config::default(), responses, batch_end_frame());
        modem.transmit(&mut []).expect("empty batch should close cleanly");
    }

    #[test]
    fn test_sender_short_source() {
        struct Truncated;

        impl FileSource for Truncated {
            fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
                if offset >= 128 {
                    return Ok(0);
                }
                buf[..128].fill(b'z');
                Ok(128)
            }
        }

        let responses = vec![Some(CRC_REQUEST), None, Some(ACK), Some(CRC_REQUEST), None, Some(ACK)];
        let mut expected_writes = header_frame("short.bin", 300);
        expected_writes.extend(data_frame(1, &[b'z'; 128]));

        let mut source = Truncated;
        let mut modem = modem(Config::default(), responses, expected_writes);
        let mut files = [OutgoingFile::new("short.bin", 300, &mut source)];

        match modem.transmit(&mut files) {
            Err(TransferError::UnexpectedEof { name, remaining }) => {
                assert_eq!(name, "short.bin");
                assert_eq!(remaining, 172);
            }
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_sender_rejects_unsendable_name() {
        let mut source: &[u8] = b"x";
        let mut modem = modem(Config::default(), vec![], vec![]);
        let mut files = [OutgoingFile::new("", 1, &mut source)];

        assert!(matches!(modem.transmit(&mut files), Err(TransferError::InvalidName(_))));
    }

    #[test]
    fn test_transition_table() {
        use TransmitState::*;

        assert_eq!(transition(Start, Event::Ready, 3, 10), Transition { next: Filename, retries_left: 10, block: BlockStep::Reset });
        assert_eq!(transition(Start, Event::NotReady, 3, 10).next, Start);
        assert_eq!(transition(Start, Event::NotReady, 1, 10).next, End(Ending::Timeout));

        assert_eq!(transition(Filename, Event::Ack { remaining: 9 }, 3, 10), Transition { next: Data, retries_left: 10, block: BlockStep::Advance });
        assert_eq!(transition(Filename, Event::BatchClosed, 3, 10).next, End(Ending::Complete));
        assert_eq!(transition(Data, Event::Ack { remaining: 9 }, 3, 10).next, Data);
        assert_eq!(transition(Data, Event::Ack { remaining: 0 }, 3, 10).next, FileDone);
        assert_eq!(transition(FileDone, Event::Ack { remaining: 0 }, 3, 10).next, Start);

        assert_eq!(transition(Data, Event::Rejected, 3, 10), Transition { next: Data, retries_left: 2, block: BlockStep::Keep });
        assert_eq!(transition(FileDone, Event::Rejected, 1, 10).next, End(Ending::Timeout));
        assert_eq!(transition(Filename, Event::Cancelled, 3, 10).next, Canceled);
        assert_eq!(transition(Canceled, Event::Cancelled, 3, 10).next, End(Ending::Cancelled));
    }
}
