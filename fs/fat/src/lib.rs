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

//! Embedded, thread-safe FAT12/16/32 engine for the Hyrax operating system.
//!
//! Mounts a [`hyrax_ds::BlockDevice`] and exposes hierarchical, path-based
//! file I/O over it. The four coupled subsystems named in the project's
//! design notes live in their own modules:
//!
//! - [`buffer`] — the sector cache (acquire/release/flush-all).
//! - [`fat`] — the allocator: FAT entry reads/writes, chain traversal,
//!   allocation and unlinking, free-cluster accounting.
//! - [`dir`] — directory-region helpers built on the buffer cache.
//! - [`mount`] — volume geometry, the open-file registry, the three named
//!   locks, and the public `open`/`read`/`write`/`seek`/`close`/... surface.
//!
//! Callers construct a [`mount::FatVolume`] with [`mount::FatVolume::mount`]
//! and drive it through opaque [`handle::FileHandle`] tokens; there is no
//! global state, each mount is an independent, self-contained instance.

pub mod buffer;
pub mod dir;
pub mod fat;
pub mod geometry;
pub mod handle;
pub mod mount;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use geometry::FatType;
pub use handle::{FileHandle, OpenMode};
pub use mount::{FatCopyPolicy, FatVolume, MountOptions};
