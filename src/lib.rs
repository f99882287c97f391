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

//! YMODEM batch file transfer with CRC-16 over a byte link.
//!
//! A [`Modem`] owns a [`Transport`] and a [`Clock`]; `receive` fills a
//! manifest of [`IncomingFile`]s and `transmit` sends a list of
//! [`OutgoingFile`]s. Each call runs one complete batch.

pub mod config;
pub mod crc;
pub mod error;
pub mod file;
pub mod modem;
pub mod packet;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod serial;

pub use config::{BlockCheck, Config, UnknownFile};
pub use error::{Ending, TransferError};
pub use file::{FileSink, FileSource, FsSink, FsSource, IncomingFile, OutgoingFile};
pub use modem::Modem;
pub use serial::{Clock, RealSerialPort, SystemClock, Transport};
