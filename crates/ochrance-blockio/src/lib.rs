// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The block I/O port.
//!
//! The engine verifies and repairs storage through this seam. The concrete
//! NVMe shim lives outside this workspace and follows the usual C
//! convention of zero on success, negative errno on failure;
//! [`BlockIoError::from_code`] is the bridge. [`FileBlockDevice`] backs the
//! CLI and the test suite with a plain file.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SMART/Health Information Log fields (NVMe log identifier 02h).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHealth {
    /// Bitmask of critical warnings; zero on a healthy device.
    pub critical_warning: u8,
    /// Composite temperature in Kelvin.
    pub composite_temperature: u16,
    /// Remaining spare capacity, percent.
    pub available_spare: u8,
    pub available_spare_threshold: u8,
    /// Rated endurance used, percent. May exceed 100.
    pub percentage_used: u8,
    /// In 512-byte units, times 1000.
    pub data_units_read: u64,
    pub data_units_written: u64,
    pub power_on_hours: u64,
    pub unsafe_shutdowns: u32,
    pub media_errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockIoError {
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("I/O failure")]
    Io,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("permission denied")]
    PermissionDenied,
    #[error("device is read-only")]
    ReadOnlyDevice,
    #[error("buffer access fault")]
    AccessFault,
    #[error("unknown device error {0}")]
    Unknown(i32),
}

const EIO: i32 = 5;
const EBADF: i32 = 9;
const EACCES: i32 = 13;
const EFAULT: i32 = 14;
const EINVAL: i32 = 22;
const EROFS: i32 = 30;

impl BlockIoError {
    /// Map a shim return code. `Ok(())` for zero, the mapped error for a
    /// negative errno, `Unknown` for anything else.
    pub fn from_code(code: i32) -> Result<(), BlockIoError> {
        match code {
            0 => Ok(()),
            c if c == -EBADF => Err(BlockIoError::BadDescriptor),
            c if c == -EIO => Err(BlockIoError::Io),
            c if c == -EINVAL => Err(BlockIoError::InvalidArgument),
            c if c == -EACCES => Err(BlockIoError::PermissionDenied),
            c if c == -EROFS => Err(BlockIoError::ReadOnlyDevice),
            c if c == -EFAULT => Err(BlockIoError::AccessFault),
            _ => Err(BlockIoError::Unknown(code)),
        }
    }
}

fn map_io_error(err: &std::io::Error) -> BlockIoError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => BlockIoError::BadDescriptor,
        ErrorKind::PermissionDenied => BlockIoError::PermissionDenied,
        ErrorKind::InvalidInput => BlockIoError::InvalidArgument,
        _ => BlockIoError::Io,
    }
}

/// The three operations the engine expects from a device.
pub trait BlockDevice {
    /// Health telemetry for integrity gating.
    fn read_health(&self) -> Result<DeviceHealth, BlockIoError>;

    /// Read one logical block at `lba` into `buffer`; the buffer length is
    /// the declared block size.
    fn read_block(&mut self, lba: u64, buffer: &mut [u8]) -> Result<(), BlockIoError>;

    /// Write one logical block at `lba` from `buffer`.
    fn write_block(&mut self, lba: u64, buffer: &[u8]) -> Result<(), BlockIoError>;
}

/// A file-backed device: the file is the block array.
#[derive(Debug)]
pub struct FileBlockDevice {
    path: PathBuf,
    file: File,
    block_size: usize,
    read_only: bool,
    health: DeviceHealth,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, BlockIoError> {
        Self::open_with_options(path, block_size, false)
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        block_size: usize,
        read_only: bool,
    ) -> Result<Self, BlockIoError> {
        if block_size == 0 {
            return Err(BlockIoError::InvalidArgument);
        }
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .map_err(|e| map_io_error(&e))?;
        Ok(Self {
            path,
            file,
            block_size,
            read_only,
            health: DeviceHealth {
                composite_temperature: 293,
                available_spare: 100,
                available_spare_threshold: 10,
                ..DeviceHealth::default()
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole blocks the backing file holds.
    pub fn block_count(&self) -> Result<u64, BlockIoError> {
        let len = self
            .file
            .metadata()
            .map_err(|e| map_io_error(&e))?
            .len();
        Ok(len / self.block_size as u64)
    }

    /// Test hook: pretend the device reports this telemetry.
    pub fn set_health(&mut self, health: DeviceHealth) {
        self.health = health;
    }

    fn offset(&self, lba: u64, buffer_len: usize) -> Result<u64, BlockIoError> {
        if buffer_len != self.block_size {
            return Err(BlockIoError::InvalidArgument);
        }
        lba.checked_mul(self.block_size as u64)
            .ok_or(BlockIoError::InvalidArgument)
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_health(&self) -> Result<DeviceHealth, BlockIoError> {
        Ok(self.health)
    }

    fn read_block(&mut self, lba: u64, buffer: &mut [u8]) -> Result<(), BlockIoError> {
        let offset = self.offset(lba, buffer.len())?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| map_io_error(&e))?;
        self.file.read_exact(buffer).map_err(|e| map_io_error(&e))
    }

    fn write_block(&mut self, lba: u64, buffer: &[u8]) -> Result<(), BlockIoError> {
        if self.read_only {
            return Err(BlockIoError::ReadOnlyDevice);
        }
        let offset = self.offset(lba, buffer.len())?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| map_io_error(&e))?;
        self.file.write_all(buffer).map_err(|e| map_io_error(&e))?;
        self.file.flush().map_err(|e| map_io_error(&e))
    }
}

/// Read every whole block off a device into memory.
pub fn read_all_blocks(
    device: &mut FileBlockDevice,
    block_size: usize,
) -> Result<Vec<Vec<u8>>, BlockIoError> {
    let count = device.block_count()?;
    tracing::debug!(count, "reading device blocks");
    let mut blocks = Vec::with_capacity(count as usize);
    for lba in 0..count {
        let mut buffer = vec![0u8; block_size];
        device.read_block(lba, &mut buffer)?;
        blocks.push(buffer);
    }
    Ok(blocks)
}
