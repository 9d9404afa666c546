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
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
};

use hyrax_ds::{BlockDevice, DataStorage, Error, IoError, Result};

pub struct DataStorageServer {
    file: File,
}

impl DataStorageServer {
    pub fn new(file_path: &str) -> Self {
        Self {
            file: File::open(file_path).unwrap(),
        }
    }
}

impl DataStorage for DataStorageServer {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(buffer, offset).unwrap();
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        self.file.write_all_at(buffer, offset).unwrap();
        Ok(())
    }
}

/// A [`BlockDevice`] backed by a regular file, for mounting a disk image.
pub struct BlockDeviceServer {
    file: File,
    block_size: u32,
}

impl BlockDeviceServer {
    pub fn new(file_path: &str, block_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(file_path)
            .map_err(|_| Error::Io(IoError::DeviceFailed))?;
        Ok(Self { file, block_size })
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
            .map_err(|_| Error::Io(IoError::DeviceFailed))
    }

    fn write_blocks(&self, lba: u64, count: u32, buffer: &[u8]) -> Result<()> {
        let offset = lba * self.block_size as u64;
        let len = count as usize * self.block_size as usize;
        self.file
            .write_all_at(&buffer[..len], offset)
            .map_err(|_| Error::Io(IoError::DeviceFailed))
    }
}
