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

use std::mem::MaybeUninit;

use hyrax_ds::BlockDevice;
use hyrax_fs::{Error, FsError, Result};
use log::error;
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, IntoBytes, KnownLayout,
};

/// Which of the three on-disk FAT entry widths a mounted volume uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// The smallest FAT entry value that terminates a cluster chain.
    pub fn end_of_chain_marker(self) -> u32 {
        match self {
            FatType::Fat12 => 0x0FF8,
            FatType::Fat16 => 0xFFF8,
            FatType::Fat32 => 0x0FFF_FFF8,
        }
    }

    /// Bits that are actually significant in a raw FAT entry of this width.
    pub fn entry_mask(self) -> u32 {
        match self {
            FatType::Fat12 => 0x0FFF,
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }
}

/// Immutable geometry of a mounted FAT volume, derived once from the BPB at
/// mount time. Everything here is a `spec.md` §3 "Volume" field except the
/// mutable `free_cluster_count`/`last_allocated_cluster`, which live on
/// [`crate::mount::FatVolume`] instead, guarded by `fat_lock`.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub sector_size: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub fat_begin_lba: u64,
    pub fat_count: u8,
    pub sectors_per_fat: u32,
    pub fat_type: FatType,
    pub cluster_begin_lba: u64,
    pub root_dir_cluster: u32,
    pub root_dir_lba: u64,
    pub root_dir_sectors: u32,
    pub total_clusters: u32,
}

impl Geometry {
    pub fn read<BD: BlockDevice>(device: &BD) -> Result<Self> {
        let sector_size = device.block_size();
        let mut sector = vec![0u8; sector_size as usize];
        device.read_blocks(0, 1, &mut sector)?;

        let mut boot_sector: BootSector = unsafe { MaybeUninit::zeroed().assume_init() };
        let bytes = boot_sector.as_mut_bytes();
        let len = bytes.len().min(sector.len());
        bytes[..len].copy_from_slice(&sector[..len]);

        let bytes_per_sector = boot_sector.bpb_bytspersec.get() as u32;
        if bytes_per_sector != sector_size {
            error!(
                "BPB bytes-per-sector ({bytes_per_sector}) does not match device block size ({sector_size})"
            );
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let sectors_per_cluster = boot_sector.bpb_secperclus as u32;
        if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
            error!("Sectors per cluster ({sectors_per_cluster}) shall be a power of 2");
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let reserved_sectors = boot_sector.bpb_rsvdseccnt.get() as u32;
        let fat_count = boot_sector.bpb_numfats;
        if fat_count != 1 && fat_count != 2 {
            error!("Number of FATs ({fat_count}) shall be 1 or 2");
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let sectors_per_fat = if boot_sector.bpb_fatsz16.get() != 0 {
            boot_sector.bpb_fatsz16.get() as u32
        } else {
            boot_sector.bpb_fatsz32.get()
        };
        if sectors_per_fat == 0 {
            error!("Sectors per FAT shall not be 0");
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let root_dir_entries = boot_sector.bpb_rootentcnt.get() as u32;
        let root_dir_bytes = root_dir_entries * DIR_ENTRY_SIZE as u32;
        let root_dir_sectors = root_dir_bytes.div_ceil(bytes_per_sector);

        let fat_begin_lba = reserved_sectors as u64;
        let root_dir_lba = fat_begin_lba + fat_count as u64 * sectors_per_fat as u64;
        let cluster_begin_lba = root_dir_lba + root_dir_sectors as u64;

        let total_sectors = if boot_sector.bpb_totsec16.get() != 0 {
            boot_sector.bpb_totsec16.get() as u32
        } else {
            boot_sector.bpb_totsec32.get()
        };
        if total_sectors as u64 <= cluster_begin_lba {
            error!("Total sector count ({total_sectors}) does not leave room for a data region");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let data_sectors = total_sectors as u64 - cluster_begin_lba;
        let total_clusters = (data_sectors / sectors_per_cluster as u64) as u32;

        let fat_type = if total_clusters < 4085 {
            FatType::Fat12
        } else if total_clusters < 65525 {
            FatType::Fat16
        } else {
            FatType::Fat32
        };

        let root_dir_cluster = if fat_type == FatType::Fat32 {
            boot_sector.bpb_rootclus.get()
        } else {
            0
        };

        Ok(Self {
            sector_size,
            sectors_per_cluster,
            bytes_per_cluster: sector_size * sectors_per_cluster,
            fat_begin_lba,
            fat_count,
            sectors_per_fat,
            fat_type,
            cluster_begin_lba,
            root_dir_cluster,
            root_dir_lba,
            root_dir_sectors,
            total_clusters,
        })
    }

    /// LBA of the first sector of `cluster` (cluster numbers start at 2).
    pub fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.cluster_begin_lba + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    pub fn is_eoc(&self, entry: u32) -> bool {
        entry >= self.fat_type.end_of_chain_marker()
    }
}

pub const DIR_ENTRY_SIZE: usize = 32;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, KnownLayout)]
pub struct BootSector {
    pub bs_jmpboot: [u8; 3],
    pub bs_oemname: [u8; 8],

    pub bpb_bytspersec: U16,
    pub bpb_secperclus: u8,
    pub bpb_rsvdseccnt: U16,
    pub bpb_numfats: u8,
    pub bpb_rootentcnt: U16,
    pub bpb_totsec16: U16,
    pub bpb_media: u8,
    pub bpb_fatsz16: U16,

    pub bpb_secpertrk: U16,
    pub bpb_numheads: U16,
    pub bpb_hiddsec: U32,

    pub bpb_totsec32: U32,

    pub bpb_fatsz32: U32,
    pub bpb_extflags: U16,
    pub bpb_fsver: U16,
    pub bpb_rootclus: U32,
    pub bpb_fsinfo: U16,
    pub bpb_bkbootsec: U16,
    pub bpb_reserved: [u8; 12],

    pub bs_drvnum: u8,
    pub bs_reserved1: u8,
    pub bs_bootsig: u8,
    pub bs_volid: U32,
    pub bs_vollab: [u8; 11],
    pub bs_filsystype: [u8; 8],

    pub bs_boot: [u8; 420],
    pub signature_word: [u8; 2],
}
