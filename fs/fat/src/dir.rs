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

//! Directory-region helpers: component #4 of `spec.md` §2, "fetch/store raw
//! 32-byte entries via the buffer manager". Long-filename parsing and full
//! directory-entry layout are out of scope (`spec.md` §1); entries here are
//! addressed and compared only by their 8.3 short name.

use hyrax_ds::BlockDevice;
use hyrax_fs::{Error, FsError, Result};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

use crate::{
    buffer::{AccessMode, BufferManager},
    fat::{self, FatState},
    geometry::{Geometry, DIR_ENTRY_SIZE},
};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_DIRECTORY: u8 = 0x10;

pub const DELETED_MARKER: u8 = 0xE5;
pub const END_MARKER: u8 = 0x00;

/// `dir_cluster = 0` is the sentinel for the FAT12/16 fixed-size root
/// directory region; any other value is a cluster number (including a
/// FAT32 volume's root, which is an ordinary cluster chain).
pub const FIXED_ROOT_REGION: u32 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub ntres: u8,
    pub crttimetenth: u8,
    pub crttime: U16,
    pub crtdate: U16,
    pub lstaccdate: U16,
    pub fstclushi: U16,
    pub wrttime: U16,
    pub wrtdate: U16,
    pub fstcluslo: U16,
    pub filesize: U32,
}

const _: () = assert!(core::mem::size_of::<RawDirEntry>() == DIR_ENTRY_SIZE);

impl RawDirEntry {
    pub fn empty() -> Self {
        Self::new_zeroed()
    }

    pub fn first_cluster(&self) -> u32 {
        (self.fstcluslo.get() as u32) | (self.fstclushi.get() as u32) << 16
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.fstcluslo.set(cluster as u16);
        self.fstclushi.set((cluster >> 16) as u16);
    }

    pub fn is_directory(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attr & ATTR_READ_ONLY != 0
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == END_MARKER || self.name[0] == DELETED_MARKER
    }

    pub fn is_end(&self) -> bool {
        self.name[0] == END_MARKER
    }

    pub fn matches_name(&self, short_name: &[u8; 11]) -> bool {
        !self.is_free() && &self.name == short_name
    }

    pub fn is_dot_entry(&self) -> bool {
        self.name == *b".          " || self.name == *b"..         "
    }
}

/// Encodes a path component into an upper-cased, space-padded 8.3 short
/// name. Long names are truncated rather than given a numeric tail
/// (`~1`-style uniquification is a long-filename concern, out of scope).
pub fn to_short_name(component: &str) -> [u8; 11] {
    let mut short = [b' '; 11];
    let (stem, extension) = match component.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, extension),
        _ => (component, ""),
    };
    for (i, byte) in stem.bytes().take(8).enumerate() {
        short[i] = byte.to_ascii_uppercase();
    }
    for (i, byte) in extension.bytes().take(3).enumerate() {
        short[8 + i] = byte.to_ascii_uppercase();
    }
    short
}

pub fn from_short_name(short: &[u8; 11]) -> String {
    let stem = std::str::from_utf8(&short[0..8]).unwrap_or("").trim_end();
    let extension = std::str::from_utf8(&short[8..11]).unwrap_or("").trim_end();
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Sector containing the `index`-th directory entry, or `None` if `index`
/// falls past the end of a directory's current allocation (the fixed root
/// region for FAT12/16, or the end of a cluster chain).
fn entry_location<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    index: u32,
) -> Result<Option<(u64, usize)>> {
    let entries_per_sector = geometry.sector_size as u32 / DIR_ENTRY_SIZE as u32;
    let sector_index = index / entries_per_sector;
    let offset = (index % entries_per_sector) as usize * DIR_ENTRY_SIZE;

    if dir_cluster == FIXED_ROOT_REGION {
        if sector_index >= geometry.root_dir_sectors {
            return Ok(None);
        }
        return Ok(Some((geometry.root_dir_lba + sector_index as u64, offset)));
    }

    let cluster_index = sector_index / geometry.sectors_per_cluster;
    let sector_in_cluster = sector_index % geometry.sectors_per_cluster;
    let cluster = fat::traverse(geometry, buffers, dir_cluster, cluster_index)?;
    if geometry.is_eoc(cluster) || cluster < 2 {
        return Ok(None);
    }
    let lba = geometry.cluster_to_lba(cluster) + sector_in_cluster as u64;
    Ok(Some((lba, offset)))
}

pub fn fetch_entry<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    index: u32,
) -> Result<Option<RawDirEntry>> {
    let Some((lba, offset)) = entry_location(geometry, buffers, dir_cluster, index)? else {
        return Ok(None);
    };
    let buffer = buffers.acquire(lba, AccessMode::Read)?;
    let entry = RawDirEntry::read_from_bytes(&buffer.data[offset..offset + DIR_ENTRY_SIZE])
        .map_err(|_| Error::Fs(FsError::Inconsistent))?;
    buffers.release(buffer)?;
    Ok(Some(entry))
}

pub fn store_entry<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    index: u32,
    entry: &RawDirEntry,
) -> Result<()> {
    let Some((lba, offset)) = entry_location(geometry, buffers, dir_cluster, index)? else {
        return Err(Error::Fs(FsError::Inconsistent));
    };
    let mut buffer = buffers.acquire(lba, AccessMode::Write)?;
    buffer.data[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    buffers.release(buffer)
}

/// Rewrites just byte 0 of an entry to the FAT "deleted" sentinel, as
/// `remove_file`/`remove_directory` require.
pub fn mark_deleted<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    index: u32,
) -> Result<()> {
    let Some((lba, offset)) = entry_location(geometry, buffers, dir_cluster, index)? else {
        return Err(Error::Fs(FsError::Inconsistent));
    };
    let mut buffer = buffers.acquire(lba, AccessMode::Write)?;
    buffer.data[offset] = DELETED_MARKER;
    buffers.release(buffer)
}

/// Case-insensitive search for `name` in `dir_cluster`. Returns the
/// matching entry and its index.
pub fn find_entry_by_name<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    name: &str,
) -> Result<Option<(u32, RawDirEntry)>> {
    let short_name = to_short_name(name);
    let mut index = 0;
    loop {
        let Some(entry) = fetch_entry(geometry, buffers, dir_cluster, index)? else {
            return Ok(None);
        };
        if entry.is_end() {
            return Ok(None);
        }
        if entry.matches_name(&short_name) {
            return Ok(Some((index, entry)));
        }
        index += 1;
    }
}

/// True if `dir_cluster` contains no entries besides `.`/`..` pseudo
/// entries (which this crate never writes itself, but tolerates on
/// foreign volumes), per `spec.md` §4.3 `remove_directory`.
pub fn is_empty<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
) -> Result<bool> {
    let mut index = 0;
    loop {
        let Some(entry) = fetch_entry(geometry, buffers, dir_cluster, index)? else {
            return Ok(true);
        };
        if entry.is_end() {
            return Ok(true);
        }
        if !entry.is_free() && !entry.is_dot_entry() {
            return Ok(false);
        }
        index += 1;
    }
}

/// Finds a free (end-of-directory or deleted) slot, extending the
/// directory's cluster chain by one cluster under `fat_lock` if every
/// currently allocated sector is occupied. The fixed FAT12/16 root region
/// cannot grow; exhausting it is `no_free_space`.
pub fn allocate_slot<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    fat_state: &mut FatState,
    dir_cluster: u32,
) -> Result<u32> {
    let mut index = 0;
    loop {
        match fetch_entry(geometry, buffers, dir_cluster, index)? {
            Some(entry) if entry.is_free() => return Ok(index),
            Some(_) => index += 1,
            None => {
                if dir_cluster == FIXED_ROOT_REGION {
                    return Err(Error::Fs(FsError::NoFreeSpace));
                }
                fat::extend_chain(geometry, buffers, fat_state, dir_cluster, 1)?;
                let entries_per_cluster =
                    geometry.bytes_per_cluster / DIR_ENTRY_SIZE as u32;
                zero_new_cluster_tail(geometry, buffers, dir_cluster, index, entries_per_cluster)?;
                return Ok(index);
            }
        }
    }
}

/// After `extend_chain` appends a fresh cluster to a directory, every
/// sector in it reads as garbage from the device's point of view; zero it
/// so entry 0 of the new cluster reads as end-of-directory.
fn zero_new_cluster_tail<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    dir_cluster: u32,
    first_new_index: u32,
    entries_per_cluster: u32,
) -> Result<()> {
    let cluster_start = first_new_index - (first_new_index % entries_per_cluster);
    let empty = RawDirEntry::empty();
    for offset in 0..entries_per_cluster {
        store_entry(geometry, buffers, dir_cluster, cluster_start + offset, &empty)?;
    }
    Ok(())
}

/// Appends a new entry named `name` with `attr` and first cluster 0 (the
/// open-for-write path allocates the cluster separately, matching
/// `spec.md` §4.3 step 3/9).
pub fn create_entry<BD: BlockDevice>(
    geometry: &Geometry,
    buffers: &BufferManager<BD>,
    fat_state: &mut FatState,
    dir_cluster: u32,
    name: &str,
    attr: u8,
) -> Result<(u32, RawDirEntry)> {
    let index = allocate_slot(geometry, buffers, fat_state, dir_cluster)?;
    let mut entry = RawDirEntry::empty();
    entry.name = to_short_name(name);
    entry.attr = attr;
    store_entry(geometry, buffers, dir_cluster, index, &entry)?;
    Ok((index, entry))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{buffer::BufferManager, test_support};

    #[test]
    fn short_name_encoding_round_trips_stem_and_extension() {
        let short = to_short_name("readme.txt");
        assert_eq!(&short, b"README  TXT");
        assert_eq!(from_short_name(&short), "README.TXT");

        let no_ext = to_short_name("makefile");
        assert_eq!(from_short_name(&no_ext), "MAKEFILE");
    }

    #[test]
    fn find_entry_by_name_is_case_insensitive_and_skips_deleted() {
        let disk = test_support::format(512, 1, 1, 50, 32);
        let geometry = Geometry::read(&disk).unwrap();
        let buffers = BufferManager::new(disk, 64 * 1024, 1, Duration::from_millis(1));
        let mut state = FatState::new(geometry.total_clusters, geometry.total_clusters);

        create_entry(&geometry, &buffers, &mut state, FIXED_ROOT_REGION, "deleted.txt", 0).unwrap();
        let (index, _) =
            find_entry_by_name(&geometry, &buffers, FIXED_ROOT_REGION, "DELETED.TXT").unwrap().unwrap();
        mark_deleted(&geometry, &buffers, FIXED_ROOT_REGION, index).unwrap();

        create_entry(&geometry, &buffers, &mut state, FIXED_ROOT_REGION, "hello.txt", 0).unwrap();

        assert!(find_entry_by_name(&geometry, &buffers, FIXED_ROOT_REGION, "deleted.txt")
            .unwrap()
            .is_none());
        let (_, found) =
            find_entry_by_name(&geometry, &buffers, FIXED_ROOT_REGION, "HELLO.txt").unwrap().unwrap();
        assert_eq!(from_short_name(&found.name), "HELLO.TXT");
    }

    #[test]
    fn allocate_slot_extends_a_full_cluster_chain_directory() {
        let disk = test_support::format(512, 1, 1, 50, 0);
        let geometry = Geometry::read(&disk).unwrap();
        let buffers = BufferManager::new(disk, 64 * 1024, 1, Duration::from_millis(1));
        let mut state = FatState::new(geometry.total_clusters, geometry.total_clusters);
        let dir_cluster = crate::fat::create_chain(&geometry, &buffers, &mut state).unwrap();
        // Zero the root cluster the way `create_directory` does, so it
        // starts out legitimately empty rather than full of garbage.
        let entries_per_cluster = geometry.bytes_per_cluster / DIR_ENTRY_SIZE as u32;
        let empty = RawDirEntry::empty();
        for offset in 0..entries_per_cluster {
            store_entry(&geometry, &buffers, dir_cluster, offset, &empty).unwrap();
        }

        for i in 0..entries_per_cluster {
            create_entry(&geometry, &buffers, &mut state, dir_cluster, &format!("f{i}"), 0).unwrap();
        }
        assert_eq!(crate::fat::chain_length(&geometry, &buffers, dir_cluster).unwrap(), 1);

        // One more entry must not fit in the first cluster and should pull
        // in a second one via `extend_chain`.
        create_entry(&geometry, &buffers, &mut state, dir_cluster, "overflow", 0).unwrap();
        assert_eq!(crate::fat::chain_length(&geometry, &buffers, dir_cluster).unwrap(), 2);
    }
}
