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

//! Sender and receiver on two threads joined by an in-memory line.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use ymodem::{
    Config, FsSink, FsSource, IncomingFile, Modem, OutgoingFile, SystemClock, TransferError,
    Transport, UnknownFile,
};

/// One end of a full-duplex byte line.
struct ChannelLine {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

fn line_pair() -> (ChannelLine, ChannelLine) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        ChannelLine { tx: a_tx, rx: a_rx, pending: VecDeque::new() },
        ChannelLine { tx: b_tx, rx: b_rx, pending: VecDeque::new() },
    )
}

impl Transport for ChannelLine {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(2)) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer hung up"));
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer hung up"))
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

fn modem(line: ChannelLine, config: Config) -> Modem {
    Modem::new(Box::new(line), Box::new(SystemClock::new()), config)
}

/// Transfer `files` and return what landed in each manifest sink, plus the
/// bytes still owed per entry.
fn transfer(files: &[(&str, Vec<u8>)], expected: &[(&str, u64)], config: Config) -> (Vec<Vec<u8>>, Vec<u64>) {
    let _ = env_logger::try_init();
    let (send_line, recv_line) = line_pair();

    let outgoing: Vec<(String, Vec<u8>)> = files.iter().map(|(n, d)| (n.to_string(), d.clone())).collect();
    let send_config = config.clone();
    let sender = thread::spawn(move || {
        let mut sources = outgoing;
        let mut list: Vec<OutgoingFile<'_>> = sources
            .iter_mut()
            .map(|(name, data)| {
                let size = data.len() as u64;
                OutgoingFile::new(name.clone(), size, data)
            })
            .collect();
        modem(send_line, send_config).transmit(&mut list)
    });

    let mut sinks: Vec<Vec<u8>> = vec![Vec::new(); expected.len()];
    let mut manifest: Vec<IncomingFile<'_>> = expected
        .iter()
        .zip(sinks.iter_mut())
        .map(|((name, max), sink)| IncomingFile::new(*name, *max, sink))
        .collect();

    modem(recv_line, config).receive(&mut manifest).expect("receive should succeed");
    let owed: Vec<u64> = manifest.iter().map(|entry| entry.size).collect();
    drop(manifest);

    sender.join().expect("sender thread panicked").expect("transmit should succeed");
    (sinks, owed)
}

#[test]
fn loopback_single_file() {
    let data = pattern(5000, 0);
    let (sinks, owed) = transfer(&[("one.bin", data.clone())], &[("one.bin", 10_000)], Config::default());

    assert_eq!(sinks[0], data);
    assert_eq!(owed, vec![0]);
}

#[test]
fn loopback_exact_block_boundary() {
    let data = pattern(3 * 1024, 7);
    let (sinks, owed) = transfer(&[("blocks.bin", data.clone())], &[("blocks.bin", u64::MAX)], Config::default());

    assert_eq!(sinks[0], data);
    assert_eq!(owed, vec![0]);
}

#[test]
fn loopback_batch_out_of_order_manifest() {
    let first = pattern(200, 1);
    let second = pattern(1500, 2);
    let empty = Vec::new();

    let (sinks, owed) = transfer(
        &[("first.txt", first.clone()), ("second.txt", second.clone()), ("empty", empty.clone())],
        &[("empty", 0), ("second.txt", 2000), ("first.txt", 200)],
        Config::default(),
    );

    assert_eq!(sinks, vec![empty, second, first]);
    assert_eq!(owed, vec![0, 0, 0]);
}

#[test]
fn loopback_skips_unlisted_file() {
    let skipped = pattern(2500, 3);
    let kept = pattern(300, 4);

    let (sinks, owed) = transfer(
        &[("unlisted.bin", skipped), ("kept.bin", kept.clone())],
        &[("kept.bin", 1000)],
        Config::default().with_unknown_file(UnknownFile::Skip),
    );

    assert_eq!(sinks[0], kept);
    assert_eq!(owed, vec![0]);
}

#[test]
fn loopback_files_on_disk() {
    let dir = std::env::temp_dir().join("ymodem_loopback_disk");
    let _ = std::fs::create_dir_all(dir.join("out"));

    let data = pattern(4100, 9);
    let input = dir.join("disk.bin");
    std::fs::write(&input, &data).unwrap();

    let (send_line, recv_line) = line_pair();
    let sender = thread::spawn(move || -> Result<(), TransferError> {
        let mut source = FsSource::open(&input)?;
        let size = source.size()?;
        let mut list = [OutgoingFile::new("disk.bin", size, &mut source)];
        modem(send_line, Config::default()).transmit(&mut list)
    });

    let mut sink = FsSink::new(dir.join("out").join("disk.bin"));
    let mut manifest = [IncomingFile::new("disk.bin", u64::MAX, &mut sink)];
    modem(recv_line, Config::default()).receive(&mut manifest).unwrap();
    assert_eq!(manifest[0].size, 0);
    drop(manifest);
    drop(sink);

    sender.join().unwrap().unwrap();

    assert_eq!(std::fs::read(dir.join("out").join("disk.bin")).unwrap(), data);
    let _ = std::fs::remove_dir_all(&dir);
}
