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

//! Open-file state (`spec.md` §3 "Open file handle") and the opaque token
//! callers are actually given. See `SPEC_FULL.md` §9 for why a `u64` token
//! into the mount's registry replaces the source's intrusive linked-list
//! node rather than a literal weak pointer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Dir,
}

/// A caller-held reference to an entry in the mount's [`crate::registry::Registry`].
/// Carries no state of its own; every field that matters lives in
/// [`OpenFile`], addressed by this id under `registry_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub(crate) u64);

/// Per-open-file cursor and chain-traversal state, `spec.md` §3/§4.3. One
/// instance lives in the registry for as long as the file is open;
/// `current_cluster_addr`/`current_cluster_index_in_chain` memoize the last
/// cluster visited so sequential reads/writes don't re-walk the chain from
/// its head, as `read`/`write` require. `seek`, per spec, always restarts
/// the walk from `first_cluster`.
#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    pub mode: OpenMode,
    pub first_cluster: u32,
    pub file_size: u64,
    pub file_pointer: u64,
    pub chain_length: u32,
    pub end_of_chain_addr: u32,

    /// Cursor memoization: the cluster holding `file_pointer`, and its
    /// distance (in clusters) from `first_cluster`. Invalidated (set to
    /// `first_cluster`/`0`) on `seek`.
    pub current_cluster_addr: u32,
    pub current_cluster_index_in_chain: u32,

    /// Where this file's directory entry lives, so `close` can flush the
    /// size field and `remove_file` can mark it deleted.
    pub dir_cluster: u32,
    pub dir_entry_index: u32,
}

impl OpenFile {
    pub fn new(
        mode: OpenMode,
        first_cluster: u32,
        file_size: u64,
        chain_length: u32,
        end_of_chain_addr: u32,
        dir_cluster: u32,
        dir_entry_index: u32,
    ) -> Self {
        Self {
            mode,
            first_cluster,
            file_size,
            file_pointer: 0,
            chain_length,
            end_of_chain_addr,
            current_cluster_addr: first_cluster,
            current_cluster_index_in_chain: 0,
            dir_cluster,
            dir_entry_index,
        }
    }

    pub fn reset_cursor(&mut self) {
        self.current_cluster_addr = self.first_cluster;
        self.current_cluster_index_in_chain = 0;
    }
}
