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

//! Mount-owned table of open files, guarded by `registry_lock`. `spec.md`
//! §5 calls this lock a leaf, never held across device I/O: every method
//! here is a short HashMap operation, nothing more.

use std::collections::HashMap;

use crate::handle::{FileHandle, OpenFile};

#[derive(Default)]
pub struct Registry {
    open: HashMap<u64, OpenFile>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
            next_id: 1,
        }
    }

    /// `None` unless some open handle already has this first cluster,
    /// matching `spec.md`'s "open() ... fail already_open if a handle for
    /// the same file exists" rule (derived from the source's linked-list
    /// walk in `FF_Open`).
    pub fn find_open_by_first_cluster(&self, first_cluster: u32) -> Option<FileHandle> {
        self.open
            .iter()
            .find(|(_, file)| file.first_cluster == first_cluster)
            .map(|(&id, _)| FileHandle(id))
    }

    pub fn insert(&mut self, file: OpenFile) -> FileHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(id, file);
        FileHandle(id)
    }

    pub fn get(&self, handle: FileHandle) -> Option<&OpenFile> {
        self.open.get(&handle.0)
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Option<&mut OpenFile> {
        self.open.get_mut(&handle.0)
    }

    pub fn remove(&mut self, handle: FileHandle) -> Option<OpenFile> {
        self.open.remove(&handle.0)
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }
}
