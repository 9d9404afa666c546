// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs::OpenOptions,
    os::fd::AsRawFd,
    os::unix::fs::FileExt,
};

use hyrax_ds::{BlockDevice, Error, IoError, Result};
use log::error;

// From <linux/fs.h>: _IO(0x12, 104)
const BLKSSZGET: libc::c_ulong = 0x1268;

/// A [`BlockDevice`] backed by a Linux block special file (e.g. `/dev/sdb1`).
///
/// The logical sector size is queried from the kernel with `ioctl(BLKSSZGET)`
/// rather than assumed, since it varies between `512` and `4096` across
/// real media.
pub struct BlockDeviceServer {
    file: std::fs::File,
    block_size: u32,
}

impl BlockDeviceServer {
    pub fn new(device_path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)
            .map_err(|_| Error::Io(IoError::DeviceFailed))?;

        let mut block_size: libc::c_int = 0;
        let result = unsafe {
            libc::ioctl(file.as_raw_fd(), BLKSSZGET, &mut block_size as *mut libc::c_int)
        };
        if result != 0 || block_size <= 0 {
            error!("BLKSSZGET ioctl on {device_path} failed");
            return Err(Error::Io(IoError::DeviceFailed));
        }

        Ok(Self {
            file,
            block_size: block_size as u32,
        })
    }
}

impl BlockDevice for BlockDeviceServer {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn read_blocks(&self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<()> {
        let offset = lba * self.block_size as u64;
        let len = count as usize * self.block_size as usize;
        self.file
            .read_exact_at(&mut buffer[..len], offset)
            .map_err(|error| {
                error!("read_blocks(lba={lba}, count={count}) failed: {error}");
                Error::Io(IoError::DeviceFailed)
            })
    }

    fn write_blocks(&self, lba: u64, count: u32, buffer: &[u8]) -> Result<()> {
        let offset = lba * self.block_size as u64;
        let len = count as usize * self.block_size as usize;
        self.file
            .write_all_at(&buffer[..len], offset)
            .map_err(|error| {
                error!("write_blocks(lba={lba}, count={count}) failed: {error}");
                Error::Io(IoError::DeviceFailed)
            })
    }
}
