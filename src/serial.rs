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

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, StopBits};

// ============================================================================
// Capability Traits
// ============================================================================

/// Byte link the protocol runs over.
pub trait Transport: Send {
    /// Non-blocking read. Returning `Ok(0)` means nothing is waiting yet;
    /// the caller does the polling.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Monotonic millisecond clock used for every deadline.
pub trait Clock: Send {
    fn now_ms(&self) -> u64;
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// How long a single read may block inside the driver before reporting no data.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A `serialport` device opened with a short read timeout.
pub struct RealSerialPort {
    inner: Box<dyn SerialPort>,
}

impl RealSerialPort {
    pub fn open(
        path: &str,
        baud: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let inner = serialport::new(path, baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(POLL_INTERVAL)
            .open()?;
        log::debug!("Opened {} at {} baud", path, baud);

        Ok(RealSerialPort { inner })
    }
}

impl Transport for RealSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.inner.read(buf) {
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        Write::write_all(&mut self.inner, bytes)?;
        self.inner.flush()
    }
}

// ============================================================================
// System Clock
// ============================================================================

/// Milliseconds since the clock was created.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

/// Scripted peer. `Some(byte)` is available to read; `None` is a gap: the line
/// stays silent until the code under test writes again, the way a real peer
/// waits for an ACK or NAK before sending more.
#[cfg(test)]
pub struct MockSerialPort {
    script: std::collections::VecDeque<Option<u8>>,
    scripted: usize,
    written: Vec<u8>,
    expected: Vec<u8>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(script: Vec<Option<u8>>, expected: Vec<u8>) -> Self {
        MockSerialPort {
            scripted: script.len(),
            script: script.into(),
            written: Vec::new(),
            expected,
        }
    }
}

#[cfg(test)]
impl Transport for MockSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.script.front() {
                Some(Some(byte)) => *slot = *byte,
                _ => break,
            }
            self.script.pop_front();
            n += 1;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.written.extend_from_slice(bytes);
        if let Some(None) = self.script.front() {
            self.script.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert!(
            self.script.is_empty(),
            "script not finished: {} of {} entries left",
            self.script.len(),
            self.scripted
        );
        assert_eq!(
            self.written, self.expected,
            "unexpected line output\nwant {:02X?}\ngot  {:02X?}",
            self.expected, self.written
        );
    }
}

/// Clock that moves forward a fixed step every time it is read.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Arc<std::sync::atomic::AtomicU64>,
    step: u64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(step: u64) -> Self {
        ManualClock {
            now: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0)),
            step,
        }
    }

    /// Shared view of the current time, readable after the clock is moved
    /// into a modem.
    pub fn handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicU64> {
        self.now.clone()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step, std::sync::atomic::Ordering::SeqCst) + self.step
    }
}
