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

//! Shared in-memory [`hyrax_ds::BlockDevice`] and volume formatter for this
//! crate's integration tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use hyrax_ds::{BlockDevice, Error, IoError, Result};

#[derive(Clone)]
pub struct RamDisk {
    sectors: Arc<Mutex<Vec<u8>>>,
    sector_size: u32,
    pub reads: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
}

impl RamDisk {
    pub fn new(sector_size: u32, total_sectors: u64) -> Self {
        Self {
            sectors: Arc::new(Mutex::new(vec![0u8; sector_size as usize * total_sectors as usize])),
            sector_size,
            reads: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn write_raw(&self, lba: u64, data: &[u8]) {
        let mut sectors = self.sectors.lock().unwrap();
        let start = lba as usize * self.sector_size as usize;
        sectors[start..start + data.len()].copy_from_slice(data);
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> u32 {
        self.sector_size
    }

    fn read_blocks(&self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let sectors = self.sectors.lock().unwrap();
        let start = lba as usize * self.sector_size as usize;
        let len = count as usize * self.sector_size as usize;
        buffer[..len].copy_from_slice(&sectors[start..start + len]);
        Ok(())
    }

    fn write_blocks(&self, lba: u64, count: u32, buffer: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut sectors = self.sectors.lock().unwrap();
        let start = lba as usize * self.sector_size as usize;
        let len = count as usize * self.sector_size as usize;
        if start + len > sectors.len() {
            return Err(Error::Io(IoError::DeviceFailed));
        }
        sectors[start..start + len].copy_from_slice(&buffer[..len]);
        Ok(())
    }
}

/// Formats a fresh FAT12/16 volume (fixed-size root directory region) with
/// `data_clusters` clusters of `sectors_per_cluster` sectors each. Mirrors
/// the on-disk layout `hyrax_fs_fat::geometry::Geometry::read` expects:
/// jump/OEM bytes, then the BPB fields it reads, at their classic offsets.
pub fn format_fat16(sector_size: u32, sectors_per_cluster: u32, data_clusters: u32) -> RamDisk {
    let reserved_sectors = 1u32;
    let fat_count = 2u8;
    let root_dir_entries = 512u32;
    let entries_per_sector = sector_size / 32;
    let root_dir_sectors = root_dir_entries.div_ceil(entries_per_sector);

    let fat_bytes_needed = (data_clusters + 2) as u64 * 2;
    let sectors_per_fat = fat_bytes_needed.div_ceil(sector_size as u64).max(1) as u32;

    let data_sectors = data_clusters as u64 * sectors_per_cluster as u64;
    let total_sectors = reserved_sectors as u64
        + fat_count as u64 * sectors_per_fat as u64
        + root_dir_sectors as u64
        + data_sectors;

    let disk = RamDisk::new(sector_size, total_sectors + 16);

    let mut boot = vec![0u8; sector_size as usize];
    boot[0] = 0xEB;
    boot[1] = 0x00;
    boot[2] = 0x90;
    boot[11..13].copy_from_slice(&(sector_size as u16).to_le_bytes());
    boot[13] = sectors_per_cluster as u8;
    boot[14..16].copy_from_slice(&(reserved_sectors as u16).to_le_bytes());
    boot[16] = fat_count;
    boot[17..19].copy_from_slice(&(root_dir_entries as u16).to_le_bytes());
    if total_sectors < 0x10000 {
        boot[19..21].copy_from_slice(&(total_sectors as u16).to_le_bytes());
    } else {
        boot[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
    }
    boot[21] = 0xF8;
    boot[22..24].copy_from_slice(&(sectors_per_fat as u16).to_le_bytes());
    boot[510] = 0x55;
    boot[511] = 0xAA;
    disk.write_raw(0, &boot);

    disk
}

/// Formats a fresh FAT32 volume: no fixed root region, the root directory
/// is an ordinary one-cluster chain at cluster 2, and sectors-per-FAT lives
/// in the BPB's 32-bit field rather than its 16-bit one. `data_clusters`
/// must be large enough that `Geometry::read` classifies the volume as
/// FAT32 (`total_clusters >= 65525`), per `spec.md` §3's width thresholds.
pub fn format_fat32(sector_size: u32, sectors_per_cluster: u32, data_clusters: u32) -> RamDisk {
    let reserved_sectors = 32u32;
    let fat_count = 2u8;

    let fat_bytes_needed = (data_clusters + 2) as u64 * 4;
    let sectors_per_fat = fat_bytes_needed.div_ceil(sector_size as u64).max(1) as u32;

    let data_sectors = data_clusters as u64 * sectors_per_cluster as u64;
    let total_sectors =
        reserved_sectors as u64 + fat_count as u64 * sectors_per_fat as u64 + data_sectors;

    let disk = RamDisk::new(sector_size, total_sectors + 16);

    let mut boot = vec![0u8; sector_size as usize];
    boot[0] = 0xEB;
    boot[1] = 0x00;
    boot[2] = 0x90;
    boot[11..13].copy_from_slice(&(sector_size as u16).to_le_bytes());
    boot[13] = sectors_per_cluster as u8;
    boot[14..16].copy_from_slice(&(reserved_sectors as u16).to_le_bytes());
    boot[16] = fat_count;
    boot[17..19].copy_from_slice(&0u16.to_le_bytes()); // bpb_rootentcnt: 0 for FAT32
    if total_sectors < 0x10000 {
        boot[19..21].copy_from_slice(&(total_sectors as u16).to_le_bytes());
    } else {
        boot[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
    }
    boot[21] = 0xF8;
    boot[22..24].copy_from_slice(&0u16.to_le_bytes()); // bpb_fatsz16: 0, width lives in bpb_fatsz32
    boot[36..40].copy_from_slice(&sectors_per_fat.to_le_bytes());
    boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // bpb_rootclus
    boot[510] = 0x55;
    boot[511] = 0xAA;
    disk.write_raw(0, &boot);

    // The root directory is cluster 2's chain; mark it end-of-chain in
    // every FAT copy so it reads back as an empty directory.
    let fat_lba = reserved_sectors as u64;
    let mut fat_sector = vec![0u8; sector_size as usize];
    fat_sector[8..12].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    for copy in 0..fat_count as u64 {
        disk.write_raw(fat_lba + copy * sectors_per_fat as u64, &fat_sector);
    }

    disk
}
