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

pub use hyrax_err::*;

/// Byte-offset addressable storage backing a mounted file system image.
///
/// This is the interface the non-cached file systems (`hyrax_fs_exfat`,
/// `hyrax_fs_ntfs`, `hyrax_fs_cdfs`) read and write through directly.
pub trait DataStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()>;
}

/// Sector-addressable block device.
///
/// Consumed by `hyrax_fs_fat`'s buffer manager, which is the only caller
/// that needs LBA/sector granularity rather than a flat byte offset. A
/// [`IoError::Busy`] result is a transient condition the caller is expected
/// to retry; any other error is terminal for the request that produced it.
pub trait BlockDevice {
    /// Size in bytes of one block (sector). Constant for the lifetime of
    /// the device.
    fn block_size(&self) -> u32;

    fn read_blocks(&self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<()>;

    fn write_blocks(&self, lba: u64, count: u32, buffer: &[u8]) -> Result<()>;
}
