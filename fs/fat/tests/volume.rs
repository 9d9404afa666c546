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

mod common;

use std::{io::SeekFrom, sync::Arc};

use hyrax_fs::{Error, FsError};
use hyrax_fs_fat::{FatVolume, MountOptions, OpenMode};

fn fresh_volume(data_clusters: u32) -> FatVolume<common::RamDisk> {
    let disk = common::format_fat16(512, 8, data_clusters);
    FatVolume::mount(disk, MountOptions::default()).unwrap()
}

#[test]
fn create_write_close_reopen_and_read_back() {
    let volume = fresh_volume(4200);

    let handle = volume.open("/a.txt", OpenMode::Write).unwrap();
    assert_eq!(volume.write(handle, b"hello").unwrap(), 5);
    volume.close(handle).unwrap();

    let handle = volume.open("/a.txt", OpenMode::Read).unwrap();
    let mut buffer = [0u8; 5];
    assert_eq!(volume.read(handle, &mut buffer).unwrap(), 5);
    assert_eq!(&buffer, b"hello");

    // EOF: nothing left to read.
    let mut trailing = [0u8; 1];
    assert_eq!(volume.read(handle, &mut trailing).unwrap(), 0);
    volume.close(handle).unwrap();
}

#[test]
fn read_with_zero_length_request_is_a_no_op() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/a.txt", OpenMode::Write).unwrap();
    volume.write(handle, b"hello").unwrap();
    volume.close(handle).unwrap();

    let handle = volume.open("/a.txt", OpenMode::Read).unwrap();
    assert_eq!(volume.read(handle, &mut []).unwrap(), 0);
    volume.close(handle).unwrap();
}

#[test]
fn multi_cluster_write_allocates_exactly_the_needed_clusters() {
    let volume = fresh_volume(4200);

    let handle = volume.open("/b.bin", OpenMode::Write).unwrap();
    let payload = vec![0xABu8; 10000];
    assert_eq!(volume.write(handle, &payload).unwrap(), 10000);
    assert_eq!(volume.seek(handle, 0, SeekFrom::End(0)).unwrap(), 10000);
    volume.close(handle).unwrap();

    let handle = volume.open("/b.bin", OpenMode::Read).unwrap();
    let mut readback = vec![0u8; 10000];
    assert_eq!(volume.read(handle, &mut readback).unwrap(), 10000);
    assert_eq!(readback, payload);
    volume.close(handle).unwrap();
}

#[test]
fn sequential_cluster_run_is_coalesced_into_one_device_read() {
    let disk = common::format_fat16(512, 8, 4200);
    let volume = FatVolume::mount(disk.clone(), MountOptions::default()).unwrap();

    let handle = volume.open("/c.bin", OpenMode::Write).unwrap();
    let payload = vec![0x11u8; 3 * 8 * 512]; // exactly 3 clusters
    volume.write(handle, &payload).unwrap();
    volume.close(handle).unwrap();

    // Re-mount so the cache starts cold, then read with nothing cached.
    let volume = FatVolume::mount(disk.clone(), MountOptions::default()).unwrap();
    let handle = volume.open("/c.bin", OpenMode::Read).unwrap();
    let reads_before = disk.read_count();
    let mut readback = vec![0u8; 3 * 8 * 512];
    volume.read(handle, &mut readback).unwrap();
    assert_eq!(disk.read_count() - reads_before, 1);
    assert_eq!(readback, payload);
    volume.close(handle).unwrap();
}

#[test]
fn opening_a_write_handle_on_an_already_open_file_is_refused() {
    let volume = Arc::new(fresh_volume(4200));
    let handle = volume.open("/c.txt", OpenMode::Write).unwrap();
    volume.write(handle, b"x").unwrap();
    volume.close(handle).unwrap();

    let reader = volume.open("/c.txt", OpenMode::Read).unwrap();
    let volume2 = volume.clone();
    let joined = std::thread::spawn(move || volume2.open("/c.txt", OpenMode::Write))
        .join()
        .unwrap();
    assert!(matches!(joined, Err(Error::Fs(FsError::AlreadyOpen))));
    volume.close(reader).unwrap();
}

#[test]
fn mkdir_then_rmdir_empty_succeeds_rmdir_again_fails_not_found() {
    let volume = fresh_volume(4200);
    volume.create_directory("/d").unwrap();
    volume.remove_directory("/d").unwrap();
    assert!(matches!(
        volume.remove_directory("/d"),
        Err(Error::Fs(FsError::NotFound))
    ));
}

#[test]
fn rmdir_on_a_non_empty_directory_fails_not_empty() {
    let volume = fresh_volume(4200);
    volume.create_directory("/e").unwrap();
    let handle = volume.open("/e/f", OpenMode::Write).unwrap();
    volume.close(handle).unwrap();
    assert!(matches!(
        volume.remove_directory("/e"),
        Err(Error::Fs(FsError::NotEmpty))
    ));
}

#[test]
fn opening_a_directory_requires_dir_mode() {
    let volume = fresh_volume(4200);
    volume.create_directory("/dirmode").unwrap();

    assert!(matches!(
        volume.open("/dirmode", OpenMode::Read),
        Err(Error::Fs(FsError::IsDirectory))
    ));
    assert!(matches!(
        volume.open("/dirmode", OpenMode::Write),
        Err(Error::Fs(FsError::IsDirectory))
    ));

    let handle = volume.open("/dirmode", OpenMode::Dir).unwrap();
    volume.close(handle).unwrap();
}

#[test]
fn opening_a_regular_file_with_dir_mode_is_rejected() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/plain.txt", OpenMode::Write).unwrap();
    volume.close(handle).unwrap();

    assert!(matches!(
        volume.open("/plain.txt", OpenMode::Dir),
        Err(Error::Fs(FsError::InvalidPath))
    ));
}

#[test]
fn seeking_to_a_negative_absolute_position_is_invalid() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/empty.txt", OpenMode::Write).unwrap();
    assert!(matches!(
        volume.seek(handle, -1, SeekFrom::Current(0)),
        Err(Error::Fs(FsError::InvalidPosition))
    ));
    volume.close(handle).unwrap();
}

#[test]
fn seeking_past_end_of_file_is_invalid_until_the_file_grows() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/seekpast.bin", OpenMode::Write).unwrap();

    // An empty file: any positive absolute seek is past `file_size = 0`.
    assert!(matches!(
        volume.seek(handle, 5000, SeekFrom::Start(0)),
        Err(Error::Fs(FsError::InvalidPosition))
    ));

    volume.write(handle, &vec![0u8; 5000]).unwrap();
    // Now file_size = 5000; seeking to it exactly is fine, one past is not.
    assert_eq!(volume.seek(handle, 5000, SeekFrom::Start(0)).unwrap(), 5000);
    assert!(matches!(
        volume.seek(handle, 5001, SeekFrom::Start(0)),
        Err(Error::Fs(FsError::InvalidPosition))
    ));

    volume.close(handle).unwrap();
}

#[test]
fn writing_mid_file_after_seek_preserves_surrounding_bytes() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/f.bin", OpenMode::Write).unwrap();
    volume.write(handle, &vec![0u8; 5000]).unwrap();
    volume.seek(handle, 2500, SeekFrom::Start(0)).unwrap();
    volume.write(handle, b"X").unwrap();
    volume.close(handle).unwrap();

    let handle = volume.open("/f.bin", OpenMode::Read).unwrap();
    volume.seek(handle, 2499, SeekFrom::Start(0)).unwrap();
    let mut two = [0u8; 2];
    volume.read(handle, &mut two).unwrap();
    assert_eq!(two, [0u8, b'X']);
    volume.close(handle).unwrap();
}

#[test]
fn remove_file_then_open_fails_not_found() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/g.txt", OpenMode::Write).unwrap();
    volume.write(handle, b"gone").unwrap();
    volume.close(handle).unwrap();

    volume.remove_file("/g.txt").unwrap();
    assert!(matches!(
        volume.open("/g.txt", OpenMode::Read),
        Err(Error::Fs(FsError::NotFound))
    ));
}

#[test]
fn truncate_shrinks_file_and_clips_a_past_end_pointer() {
    let volume = fresh_volume(4200);
    let handle = volume.open("/h.bin", OpenMode::Write).unwrap();
    volume.write(handle, &vec![7u8; 10000]).unwrap();
    volume.seek(handle, 9000, SeekFrom::Start(0)).unwrap();
    volume.truncate(handle, 4000).unwrap();
    assert_eq!(volume.seek(handle, 0, SeekFrom::Current(0)).unwrap(), 4000);
    assert_eq!(volume.seek(handle, 0, SeekFrom::End(0)).unwrap(), 4000);
    volume.close(handle).unwrap();

    let handle = volume.open("/h.bin", OpenMode::Read).unwrap();
    assert_eq!(volume.seek(handle, 0, SeekFrom::End(0)).unwrap(), 4000);
    volume.close(handle).unwrap();
}

#[test]
fn multi_cluster_extension_decreases_free_count_by_exactly_the_chain_length() {
    let volume = fresh_volume(4200);
    let free_before = volume.free_cluster_count();

    let handle = volume.open("/b.bin", OpenMode::Write).unwrap();
    volume.write(handle, &vec![0xABu8; 10000]).unwrap(); // ceil(10000/4096) = 3 clusters
    volume.close(handle).unwrap();

    assert_eq!(volume.free_cluster_count(), free_before - 3);
}

#[test]
fn removing_the_last_file_on_a_full_volume_restores_the_free_count() {
    // A volume with exactly one allocatable cluster: write one cluster's
    // worth of data (filling it), then delete the file and confirm the
    // free count returns to its pre-creation value (`spec.md` §8).
    let disk = common::format_fat16(512, 8, 1);
    let volume = FatVolume::mount(disk, MountOptions::default()).unwrap();
    let free_before = volume.free_cluster_count();

    let handle = volume.open("/only.bin", OpenMode::Write).unwrap();
    volume.write(handle, &vec![0x42u8; 4096]).unwrap();
    volume.close(handle).unwrap();
    assert_eq!(volume.free_cluster_count(), free_before - 1);

    volume.remove_file("/only.bin").unwrap();
    assert_eq!(volume.free_cluster_count(), free_before);
}

fn fresh_fat32_volume() -> FatVolume<common::RamDisk> {
    // sectors_per_cluster=1 keeps the in-memory image a manageable ~34MiB
    // while still clearing the 65525-cluster FAT32 threshold.
    let disk = common::format_fat32(512, 1, 65600);
    FatVolume::mount(disk, MountOptions::default()).unwrap()
}

#[test]
fn fat32_create_write_close_reopen_and_read_back() {
    let volume = fresh_fat32_volume();

    let handle = volume.open("/a.txt", OpenMode::Write).unwrap();
    assert_eq!(volume.write(handle, b"hello").unwrap(), 5);
    volume.close(handle).unwrap();

    let handle = volume.open("/a.txt", OpenMode::Read).unwrap();
    let mut buffer = [0u8; 5];
    assert_eq!(volume.read(handle, &mut buffer).unwrap(), 5);
    assert_eq!(&buffer, b"hello");
    volume.close(handle).unwrap();
}

#[test]
fn fat32_mkdir_then_rmdir_empty_succeeds_rmdir_again_fails_not_found() {
    let volume = fresh_fat32_volume();
    volume.create_directory("/d").unwrap();
    volume.remove_directory("/d").unwrap();
    assert!(matches!(
        volume.remove_directory("/d"),
        Err(Error::Fs(FsError::NotFound))
    ));
}

#[test]
fn fat32_root_directory_as_a_cluster_chain_accepts_files_and_subdirectories() {
    let volume = fresh_fat32_volume();
    volume.create_directory("/sub").unwrap();
    let handle = volume.open("/sub/f.bin", OpenMode::Write).unwrap();
    volume.write(handle, &vec![0x5Au8; 9000]).unwrap(); // spans multiple clusters
    volume.close(handle).unwrap();

    let handle = volume.open("/sub/f.bin", OpenMode::Read).unwrap();
    let mut readback = vec![0u8; 9000];
    assert_eq!(volume.read(handle, &mut readback).unwrap(), 9000);
    assert_eq!(readback, vec![0x5Au8; 9000]);
    volume.close(handle).unwrap();
}

#[test]
fn unmount_is_refused_while_a_file_is_still_open() {
    let disk = common::format_fat16(512, 8, 4200);
    let volume = FatVolume::mount(disk, MountOptions::default()).unwrap();
    let handle = volume.open("/i.txt", OpenMode::Write).unwrap();
    volume.write(handle, b"data").unwrap();

    assert!(matches!(
        volume.unmount(),
        Err(Error::Fs(FsError::AlreadyOpen))
    ));
}
