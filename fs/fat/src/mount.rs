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

//! Mount state and the file I/O engine surface (`spec.md` §4.3/§4.4).
//! Lock order is `dir_lock` → `fat_lock`, `registry_lock` a leaf never held
//! across device I/O (`spec.md` §5) — every public method here takes at
//! most one of `dir_lock`/`fat_lock` for its whole body and touches
//! `registry_lock` only for brief, lock-released-before-I/O bookkeeping.

use std::{
    io::SeekFrom,
    sync::Mutex,
    time::Duration,
};

use hyrax_fs::{Error, FsError, Result};
use hyrax_ds::BlockDevice;
use log::{debug, trace};

use crate::{
    buffer::{AccessMode, BufferManager},
    dir::{self, RawDirEntry, ATTR_DIRECTORY, FIXED_ROOT_REGION},
    fat::{self, FatState},
    geometry::{Geometry, DIR_ENTRY_SIZE},
    handle::{FileHandle, OpenFile, OpenMode},
    registry::Registry,
};

/// The destination of a `transfer` call: a mutable slice to fill for reads,
/// or a borrowed, read-only slice to copy out of for writes. Keeping the
/// write side borrowed rather than owned avoids cloning the caller's whole
/// payload just to satisfy a single `&mut [u8]` signature.
enum TransferBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl TransferBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            TransferBuffer::Read(buffer) => buffer.len(),
            TransferBuffer::Write(buffer) => buffer.len(),
        }
    }

    fn access_mode(&self) -> AccessMode {
        match self {
            TransferBuffer::Read(_) => AccessMode::Read,
            TransferBuffer::Write(_) => AccessMode::Write,
        }
    }
}

/// How many of a volume's FAT copies this mount keeps mirrored on every
/// write, per `spec.md` §6's `fat_copy_count` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatCopyPolicy {
    /// Mirror only the first FAT; the rest go stale, matching volumes
    /// that never read back copy 2+.
    Primary,
    /// Mirror every FAT copy the BPB advertises.
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    pub cache_size_bytes: usize,
    pub driver_busy_sleep: Duration,
    pub fat_copy_count: FatCopyPolicy,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            cache_size_bytes: 64 * 1024,
            driver_busy_sleep: Duration::from_millis(1),
            fat_copy_count: FatCopyPolicy::All,
        }
    }
}

pub struct FatVolume<BD: BlockDevice> {
    geometry: Geometry,
    buffers: BufferManager<BD>,
    fat_lock: Mutex<FatState>,
    dir_lock: Mutex<()>,
    registry: Mutex<Registry>,
}

impl<BD: BlockDevice> FatVolume<BD> {
    pub fn mount(device: BD, options: MountOptions) -> Result<Self> {
        let geometry = Geometry::read(&device)?;
        let fat_copy_count_active = match options.fat_copy_count {
            FatCopyPolicy::Primary => 1,
            FatCopyPolicy::All => geometry.fat_count,
        };
        let buffers = BufferManager::new(
            device,
            options.cache_size_bytes,
            fat_copy_count_active,
            options.driver_busy_sleep,
        );

        let mut free_cluster_count = 0;
        for cluster in 2..geometry.total_clusters + 2 {
            if fat::get_fat_entry(&geometry, &buffers, cluster)? == 0 {
                free_cluster_count += 1;
            }
        }
        debug!(
            "mounted {:?} volume: {} clusters, {} free",
            geometry.fat_type, geometry.total_clusters, free_cluster_count
        );

        Ok(Self {
            fat_lock: Mutex::new(FatState::new(free_cluster_count, geometry.total_clusters)),
            dir_lock: Mutex::new(()),
            registry: Mutex::new(Registry::new()),
            buffers,
            geometry,
        })
    }

    /// Flushes every dirty buffer and consumes the volume. Refuses while
    /// any file is open, reusing [`FsError::AlreadyOpen`] for "still in
    /// use" rather than adding a dedicated variant.
    pub fn unmount(self) -> Result<()> {
        if !self.registry.lock().unwrap().is_empty() {
            return Err(Error::Fs(FsError::AlreadyOpen));
        }
        self.buffers.flush_all()
    }

    /// The volume's current free-cluster count (`spec.md` §3's mutable
    /// `free_cluster_count`), for embedders that want to report free space
    /// and for the invariant in `spec.md` §8: `sum(open chain lengths) +
    /// free_cluster_count == total_clusters`.
    pub fn free_cluster_count(&self) -> u32 {
        self.fat_lock.lock().unwrap().free_cluster_count
    }

    fn root_dir_ref(&self) -> u32 {
        if self.geometry.root_dir_cluster != 0 {
            self.geometry.root_dir_cluster
        } else {
            FIXED_ROOT_REGION
        }
    }

    /// Splits a `/`-separated path into (parent components, final name).
    fn split_path(path: &str) -> Result<(Vec<&str>, &str)> {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let name = components.pop().ok_or(Error::Fs(FsError::InvalidPath))?;
        Ok((components, name))
    }

    /// Walks `components` from the root, requiring each to be an existing
    /// directory. Returns the cluster (or [`FIXED_ROOT_REGION`]) of the
    /// final directory.
    fn resolve_dir(&self, components: &[&str]) -> Result<u32> {
        let mut current = self.root_dir_ref();
        for component in components {
            let Some((_, entry)) =
                dir::find_entry_by_name(&self.geometry, &self.buffers, current, component)?
            else {
                return Err(Error::Fs(FsError::InvalidPath));
            };
            if !entry.is_directory() {
                return Err(Error::Fs(FsError::InvalidPath));
            }
            current = entry.first_cluster();
        }
        Ok(current)
    }

    fn resolve_parent<'a>(&self, path: &'a str) -> Result<(u32, &'a str)> {
        let (components, name) = Self::split_path(path)?;
        let parent = self.resolve_dir(&components)?;
        Ok((parent, name))
    }

    pub fn open(&self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        let _dir_guard = self.dir_lock.lock().unwrap();
        let (parent_cluster, name) = self.resolve_parent(path)?;

        let found = dir::find_entry_by_name(&self.geometry, &self.buffers, parent_cluster, name)?;

        let (entry_index, entry) = match found {
            Some((index, entry)) => {
                if entry.is_directory() && mode != OpenMode::Dir {
                    return Err(Error::Fs(FsError::IsDirectory));
                }
                if mode == OpenMode::Dir && !entry.is_directory() {
                    return Err(Error::Fs(FsError::InvalidPath));
                }
                if mode == OpenMode::Write && entry.is_read_only() {
                    return Err(Error::Fs(FsError::ReadOnlyFile));
                }
                (index, entry)
            }
            None => {
                if mode != OpenMode::Write {
                    return Err(Error::Fs(FsError::NotFound));
                }
                let mut fat_state = self.fat_lock.lock().unwrap();
                let (index, mut entry) =
                    dir::create_entry(&self.geometry, &self.buffers, &mut fat_state, parent_cluster, name, 0)?;
                let first_cluster = fat::create_chain(&self.geometry, &self.buffers, &mut fat_state)?;
                entry.set_first_cluster(first_cluster);
                dir::store_entry(&self.geometry, &self.buffers, parent_cluster, index, &entry)?;
                trace!("created {name} at cluster {first_cluster}");
                (index, entry)
            }
        };

        let first_cluster = entry.first_cluster();
        {
            let registry = self.registry.lock().unwrap();
            if registry.find_open_by_first_cluster(first_cluster).is_some() {
                return Err(Error::Fs(FsError::AlreadyOpen));
            }
        }

        let (chain_length, end_of_chain_addr) = if first_cluster >= 2 {
            (
                fat::chain_length(&self.geometry, &self.buffers, first_cluster)?,
                fat::find_end_of_chain(&self.geometry, &self.buffers, first_cluster)?,
            )
        } else {
            (0, 0)
        };

        let file = OpenFile::new(
            mode,
            first_cluster,
            entry.filesize.get() as u64,
            chain_length,
            end_of_chain_addr,
            parent_cluster,
            entry_index,
        );
        let handle = self.registry.lock().unwrap().insert(file);
        Ok(handle)
    }

    pub fn close(&self, handle: FileHandle) -> Result<()> {
        let file = self
            .registry
            .lock()
            .unwrap()
            .remove(handle)
            .ok_or(Error::Fs(FsError::Index))?;

        if file.mode == OpenMode::Write {
            let _dir_guard = self.dir_lock.lock().unwrap();
            if let Some(mut entry) = dir::fetch_entry(
                &self.geometry,
                &self.buffers,
                file.dir_cluster,
                file.dir_entry_index,
            )? {
                entry.set_first_cluster(file.first_cluster);
                entry.filesize.set(file.file_size as u32);
                dir::store_entry(
                    &self.geometry,
                    &self.buffers,
                    file.dir_cluster,
                    file.dir_entry_index,
                    &entry,
                )?;
            }
        }
        if file.mode == OpenMode::Write {
            self.buffers.flush_all()?;
        }
        Ok(())
    }

    pub fn read(&self, handle: FileHandle, buffer: &mut [u8]) -> Result<usize> {
        let mut file = self
            .registry
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .ok_or(Error::Fs(FsError::Index))?;

        let remaining_in_file = file.file_size.saturating_sub(file.file_pointer);
        let to_read = (buffer.len() as u64).min(remaining_in_file) as usize;

        let transferred = self.transfer(&mut file, TransferBuffer::Read(&mut buffer[..to_read]))?;

        if let Some(slot) = self.registry.lock().unwrap().get_mut(handle) {
            *slot = file;
        }
        Ok(transferred)
    }

    pub fn write(&self, handle: FileHandle, buffer: &[u8]) -> Result<usize> {
        let mut file = self
            .registry
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .ok_or(Error::Fs(FsError::Index))?;
        if file.mode != OpenMode::Write {
            return Err(Error::Fs(FsError::ReadOnlyFile));
        }

        let end_offset = file.file_pointer + buffer.len() as u64;
        self.ensure_capacity(&mut file, end_offset)?;

        let transferred = self.transfer(&mut file, TransferBuffer::Write(buffer))?;

        if file.file_pointer > file.file_size {
            file.file_size = file.file_pointer;
        }
        if let Some(slot) = self.registry.lock().unwrap().get_mut(handle) {
            *slot = file;
        }
        Ok(transferred)
    }

    /// Grows the cluster chain (and, if the file has none yet, allocates
    /// its first cluster) so every byte up to `end_offset` has a backing
    /// cluster. Mirrors the source's eager single-cluster allocation for
    /// zero-size write-mode files and its `FF_ExtendFile` growth path.
    fn ensure_capacity(&self, file: &mut OpenFile, end_offset: u64) -> Result<()> {
        let bytes_per_cluster = self.geometry.bytes_per_cluster as u64;
        let needed_clusters = end_offset.div_ceil(bytes_per_cluster).max(1) as u32;

        if file.first_cluster < 2 {
            let mut fat_state = self.fat_lock.lock().unwrap();
            let cluster = fat::create_chain(&self.geometry, &self.buffers, &mut fat_state)?;
            file.first_cluster = cluster;
            file.chain_length = 1;
            file.end_of_chain_addr = cluster;
            file.reset_cursor();
        }

        if needed_clusters > file.chain_length {
            let mut fat_state = self.fat_lock.lock().unwrap();
            let additional = needed_clusters - file.chain_length;
            let new_tail = fat::extend_chain(
                &self.geometry,
                &self.buffers,
                &mut fat_state,
                file.first_cluster,
                additional,
            )?;
            file.chain_length = needed_clusters;
            file.end_of_chain_addr = new_tail;
        }
        Ok(())
    }

    /// Drives the byte range `[file.file_pointer, file.file_pointer +
    /// buffer.len())` through the cache, advancing the cursor as it goes.
    /// Sub-sector and sector-granular segments go through the buffer
    /// cache one sector at a time; a segment that is both cluster-aligned
    /// and at least one whole cluster long is coalesced across every
    /// sequential cluster in the run and issued as a single direct device
    /// call, per `spec.md` §4.3's bulk-cluster phase.
    fn transfer(&self, file: &mut OpenFile, mut buffer: TransferBuffer) -> Result<usize> {
        let sector_size = self.geometry.sector_size as u64;
        let bytes_per_cluster = self.geometry.bytes_per_cluster as u64;
        let mode = buffer.access_mode();
        let len = buffer.len();
        let mut done = 0usize;

        while done < len {
            if file.first_cluster < 2 {
                break;
            }
            let cluster_index = (file.file_pointer / bytes_per_cluster) as u32;
            let delta = cluster_index - file.current_cluster_index_in_chain;
            let cluster = fat::traverse(&self.geometry, &self.buffers, file.current_cluster_addr, delta)?;
            if self.geometry.is_eoc(cluster) || cluster < 2 {
                break;
            }
            file.current_cluster_addr = cluster;
            file.current_cluster_index_in_chain = cluster_index;

            let offset_in_cluster = file.file_pointer % bytes_per_cluster;
            let remaining_in_request = (len - done) as u64;

            let cluster_aligned = offset_in_cluster == 0;
            let whole_clusters_remaining = remaining_in_request / bytes_per_cluster;

            if cluster_aligned && whole_clusters_remaining >= 1 {
                // `get_sequential_clusters` treats a limit of 0 as
                // unbounded, so a remaining-count of exactly 1 cluster
                // must short-circuit rather than pass 0 through.
                let cap = (whole_clusters_remaining - 1) as u32;
                let run = if cap == 0 {
                    1
                } else {
                    fat::get_sequential_clusters(&self.geometry, &self.buffers, cluster, cap)? + 1
                };
                let lba = self.geometry.cluster_to_lba(cluster);
                let sector_count = run * self.geometry.sectors_per_cluster;
                let byte_count = run as u64 * bytes_per_cluster;
                match &mut buffer {
                    TransferBuffer::Read(dest) => {
                        self.buffers.read_direct(lba, sector_count, &mut dest[done..done + byte_count as usize])?
                    }
                    TransferBuffer::Write(src) => {
                        self.buffers.write_direct(lba, sector_count, &src[done..done + byte_count as usize])?
                    }
                }
                done += byte_count as usize;
                file.file_pointer += byte_count;
                file.current_cluster_index_in_chain += run - 1;
                file.current_cluster_addr = fat::traverse(&self.geometry, &self.buffers, cluster, run - 1)?;
                continue;
            }

            let offset_in_sector = (file.file_pointer % sector_size) as usize;
            let sector_in_cluster = (offset_in_cluster / sector_size) as u64;
            let lba = self.geometry.cluster_to_lba(cluster) + sector_in_cluster;
            let this_chunk = (sector_size as usize - offset_in_sector).min(len - done);

            let mut sector_buf = self.buffers.acquire(lba, mode)?;
            match &mut buffer {
                TransferBuffer::Read(dest) => {
                    dest[done..done + this_chunk]
                        .copy_from_slice(&sector_buf.data[offset_in_sector..offset_in_sector + this_chunk]);
                }
                TransferBuffer::Write(src) => {
                    sector_buf.data[offset_in_sector..offset_in_sector + this_chunk]
                        .copy_from_slice(&src[done..done + this_chunk]);
                }
            }
            self.buffers.release(sector_buf)?;

            done += this_chunk;
            file.file_pointer += this_chunk as u64;
        }
        Ok(done)
    }

    pub fn seek(&self, handle: FileHandle, offset: i64, origin: SeekFrom) -> Result<u64> {
        let mut registry = self.registry.lock().unwrap();
        let file = registry.get_mut(handle).ok_or(Error::Fs(FsError::Index))?;

        let base = match origin {
            SeekFrom::Start(_) => 0i64,
            SeekFrom::Current(_) => file.file_pointer as i64,
            SeekFrom::End(_) => file.file_size as i64,
        };
        let new_pos = base + offset;
        if new_pos < 0 || new_pos > file.file_size as i64 {
            return Err(Error::Fs(FsError::InvalidPosition));
        }

        file.file_pointer = new_pos as u64;
        file.reset_cursor();
        Ok(file.file_pointer)
    }

    pub fn truncate(&self, handle: FileHandle, new_size: u64) -> Result<()> {
        let mut file = self
            .registry
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .ok_or(Error::Fs(FsError::Index))?;
        if file.mode != OpenMode::Write {
            return Err(Error::Fs(FsError::ReadOnlyFile));
        }
        if new_size > file.file_size {
            return Err(Error::Fs(FsError::InvalidPosition));
        }

        let bytes_per_cluster = self.geometry.bytes_per_cluster as u64;
        let needed_clusters = new_size.div_ceil(bytes_per_cluster) as u32;

        if needed_clusters < file.chain_length && file.first_cluster >= 2 {
            let mut fat_state = self.fat_lock.lock().unwrap();
            if needed_clusters == 0 {
                fat::unlink_chain(&self.geometry, &self.buffers, &mut fat_state, file.first_cluster, 0)?;
                file.first_cluster = 0;
                file.chain_length = 0;
                file.end_of_chain_addr = 0;
            } else {
                let new_tail =
                    fat::traverse(&self.geometry, &self.buffers, file.first_cluster, needed_clusters - 1)?;
                let stop_before = fat::get_fat_entry(&self.geometry, &self.buffers, new_tail)?;
                fat::unlink_chain(
                    &self.geometry,
                    &self.buffers,
                    &mut fat_state,
                    file.first_cluster,
                    stop_before,
                )?;
                file.chain_length = needed_clusters;
                file.end_of_chain_addr = new_tail;
            }
        }

        file.file_size = new_size;
        if file.file_pointer > new_size {
            file.file_pointer = new_size;
        }
        file.reset_cursor();

        if let Some(slot) = self.registry.lock().unwrap().get_mut(handle) {
            *slot = file;
        }
        Ok(())
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        let _dir_guard = self.dir_lock.lock().unwrap();
        let (parent_cluster, name) = self.resolve_parent(path)?;
        let (index, entry) = dir::find_entry_by_name(&self.geometry, &self.buffers, parent_cluster, name)?
            .ok_or(Error::Fs(FsError::NotFound))?;
        if entry.is_directory() {
            return Err(Error::Fs(FsError::IsDirectory));
        }
        if entry.is_read_only() {
            return Err(Error::Fs(FsError::ReadOnlyFile));
        }

        let first_cluster = entry.first_cluster();
        {
            let registry = self.registry.lock().unwrap();
            if registry.find_open_by_first_cluster(first_cluster).is_some() {
                return Err(Error::Fs(FsError::AlreadyOpen));
            }
        }

        {
            let mut fat_state = self.fat_lock.lock().unwrap();
            fat::unlink_chain(&self.geometry, &self.buffers, &mut fat_state, first_cluster, 0)?;
        }
        dir::mark_deleted(&self.geometry, &self.buffers, parent_cluster, index)
    }

    pub fn remove_directory(&self, path: &str) -> Result<()> {
        let _dir_guard = self.dir_lock.lock().unwrap();
        let (parent_cluster, name) = self.resolve_parent(path)?;
        let (index, entry) = dir::find_entry_by_name(&self.geometry, &self.buffers, parent_cluster, name)?
            .ok_or(Error::Fs(FsError::NotFound))?;
        if !entry.is_directory() {
            return Err(Error::Fs(FsError::InvalidPath));
        }

        let first_cluster = entry.first_cluster();
        if !dir::is_empty(&self.geometry, &self.buffers, first_cluster)? {
            return Err(Error::Fs(FsError::NotEmpty));
        }

        {
            let mut fat_state = self.fat_lock.lock().unwrap();
            fat::unlink_chain(&self.geometry, &self.buffers, &mut fat_state, first_cluster, 0)?;
        }
        dir::mark_deleted(&self.geometry, &self.buffers, parent_cluster, index)
    }

    /// Supplement per `SPEC_FULL.md` §4: symmetric with `remove_directory`.
    pub fn create_directory(&self, path: &str) -> Result<()> {
        let _dir_guard = self.dir_lock.lock().unwrap();
        let (parent_cluster, name) = self.resolve_parent(path)?;
        if dir::find_entry_by_name(&self.geometry, &self.buffers, parent_cluster, name)?.is_some() {
            return Err(Error::Fs(FsError::InvalidPath));
        }

        let mut fat_state = self.fat_lock.lock().unwrap();
        let new_cluster = fat::create_chain(&self.geometry, &self.buffers, &mut fat_state)?;

        let entries_per_cluster = self.geometry.bytes_per_cluster / crate::geometry::DIR_ENTRY_SIZE as u32;
        let empty = RawDirEntry::empty();
        for offset in 0..entries_per_cluster {
            dir::store_entry(&self.geometry, &self.buffers, new_cluster, offset, &empty)?;
        }

        let index = dir::allocate_slot(&self.geometry, &self.buffers, &mut fat_state, parent_cluster)?;
        let mut entry = RawDirEntry::empty();
        entry.name = dir::to_short_name(name);
        entry.attr = ATTR_DIRECTORY;
        entry.set_first_cluster(new_cluster);
        dir::store_entry(&self.geometry, &self.buffers, parent_cluster, index, &entry)
    }
}
