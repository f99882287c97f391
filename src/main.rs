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

use clap::{Parser, Subcommand};
use serialport::{DataBits, Parity, StopBits};
use std::path::PathBuf;
use std::time::Duration;
use ymodem::protocol::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};
use ymodem::{
    BlockCheck, Config, FileSink, FileSource, FsSink, FsSource, IncomingFile, Modem,
    OutgoingFile, RealSerialPort, SystemClock, UnknownFile,
};

#[derive(Parser)]
#[command(name = "ymodem")]
#[command(about = "YMODEM batch file transfer over a serial port", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS", value_parser = parse_data_bits)]
    data_bits: DataBits,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none", value_parser = parse_parity)]
    parity: Parity,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS", value_parser = parse_stop_bits)]
    stop_bits: StopBits,

    /// Attempts per step before giving up
    #[arg(long, default_value_t = DEFAULT_RETRIES, value_name = "N")]
    retries: u8,

    /// How long to wait for the peer on each read
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, value_name = "MS")]
    timeout_ms: u64,

    /// Accept a block when either its number or complement is right
    #[arg(long)]
    lenient_block_check: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files as one batch
    Send {
        /// Files to send, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Receive the named files
    Receive {
        /// Directory to save received files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Skip files that are not listed instead of ending the batch
        #[arg(long)]
        skip_unknown: bool,

        /// Expected files as NAME or NAME:MAX_SIZE
        #[arg(required = true, value_name = "NAME[:MAX_SIZE]", value_parser = parse_expected)]
        expected: Vec<(String, u64)>,
    },
}

fn parse_data_bits(arg: &str) -> Result<DataBits, String> {
    Ok(match arg {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => return Err(format!("expected 5, 6, 7 or 8, got '{}'", arg)),
    })
}

fn parse_parity(arg: &str) -> Result<Parity, String> {
    Ok(match arg.to_ascii_lowercase().as_str() {
        "none" | "n" => Parity::None,
        "odd" | "o" => Parity::Odd,
        "even" | "e" => Parity::Even,
        _ => return Err(format!("expected none, odd or even, got '{}'", arg)),
    })
}

fn parse_stop_bits(arg: &str) -> Result<StopBits, String> {
    Ok(match arg {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => return Err(format!("expected 1 or 2, got '{}'", arg)),
    })
}

fn parse_expected(arg: &str) -> Result<(String, u64), String> {
    let (name, max_size) = match arg.rsplit_once(':') {
        Some((name, size)) => {
            let size = size
                .parse()
                .map_err(|_| format!("Invalid size in '{}'", arg))?;
            (name, size)
        }
        None => (arg, u64::MAX),
    };
    if name.is_empty() {
        return Err(format!("Missing file name in '{}'", arg));
    }
    Ok((name.to_string(), max_size))
}

fn fail(message: impl std::fmt::Display) -> ! {
    log::error!("{}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let block_check = if cli.lenient_block_check { BlockCheck::Lenient } else { BlockCheck::Strict };
    let mut config = Config::default()
        .with_retries(cli.retries)
        .with_timeout(Duration::from_millis(cli.timeout_ms))
        .with_block_check(block_check);

    log::info!(
        "{}: {} baud, {:?}, {:?}, {:?}",
        cli.port, cli.baud, cli.data_bits, cli.parity, cli.stop_bits
    );
    let line = RealSerialPort::open(&cli.port, cli.baud, cli.data_bits, cli.parity, cli.stop_bits)
        .unwrap_or_else(|e| fail(format!("Cannot open {}: {}", cli.port, e)));
    let clock = Box::new(SystemClock::new());

    match cli.command {
        Commands::Send { files } => {
            let mut modem = Modem::new(Box::new(line), clock, config);
            if let Err(e) = send_files(&mut modem, &files) {
                fail(format!("Send failed: {}", e));
            }
            log::info!("Files sent successfully!");
        }
        Commands::Receive { output_dir, skip_unknown, expected } => {
            if skip_unknown {
                config = config.with_unknown_file(UnknownFile::Skip);
            }
            let mut modem = Modem::new(Box::new(line), clock, config);
            if let Err(e) = receive_files(&mut modem, &output_dir, &expected) {
                fail(format!("Receive failed: {}", e));
            }
            log::info!("Files received successfully!");
        }
    }
}

fn send_files(modem: &mut Modem, paths: &[PathBuf]) -> Result<(), ymodem::TransferError> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ymodem::TransferError::InvalidName(path.display().to_string()))?
            .to_string();
        let source = FsSource::open(path)?;
        let size = source.size()?;
        sources.push((name, size, source));
    }

    let mut files: Vec<OutgoingFile<'_>> = sources
        .iter_mut()
        .map(|(name, size, source)| OutgoingFile::new(name.clone(), *size, source as &mut dyn FileSource))
        .collect();

    modem.transmit(&mut files)
}

fn receive_files(
    modem: &mut Modem,
    output_dir: &std::path::Path,
    expected: &[(String, u64)],
) -> Result<(), ymodem::TransferError> {
    if !output_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", output_dir.display()),
        )
        .into());
    }

    let mut sinks: Vec<FsSink> = expected
        .iter()
        .map(|(name, _)| FsSink::new(output_dir.join(name)))
        .collect();

    let mut manifest: Vec<IncomingFile<'_>> = expected
        .iter()
        .zip(sinks.iter_mut())
        .map(|((name, max_size), sink)| IncomingFile::new(name.clone(), *max_size, sink as &mut dyn FileSink))
        .collect();

    modem.receive(&mut manifest)
}
