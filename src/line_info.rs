// Copyright (c) 2026 kernel-xref Authors.
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

use std::collections::BTreeMap;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::utils::normalize_source_path;

/// File named by a debug annotation. Intermediate listings refer to files by a numeric
/// index whose `.file` entry may only show up later in the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileRef {
    Path(String),
    Index(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: FileRef,
    pub line: u32, // 0 means unknown / prologue
}

impl SourceLocation {
    pub fn new(path: &str, line: u32) -> Self {
        Self {
            file: FileRef::Path(normalize_source_path(path)),
            line,
        }
    }

    pub fn indexed(index: u32, line: u32) -> Self {
        Self {
            file: FileRef::Index(index),
            line,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: FileRef::Path(String::new()),
            line: 0,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.file {
            FileRef::Path(p) if !p.is_empty() => Some(p.as_str()),
            _ => None,
        }
    }

    /// A location is resolved once it names a literal file and a real line.
    pub fn is_resolved(&self) -> bool {
        self.line > 0 && self.path().is_some()
    }
}

/// Index → path table built from `.file` directives.
pub struct FileTable {
    files_by_id: BTreeMap<u32, String>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            files_by_id: BTreeMap::new(),
        }
    }

    pub fn add_file(&mut self, id: u32, path: &str) -> String {
        let path = normalize_source_path(path);
        self.files_by_id.insert(id, path.clone());
        path
    }

    pub fn get_by_id(&self, id: u32) -> Option<&String> {
        self.files_by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.files_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files_by_id.is_empty()
    }
}

/// Per-kernel assembly address → source location, in the order the addresses were seen.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLineMap<A: Hash + Eq> {
    pub entries: IndexMap<A, SourceLocation>,
}

impl<A: Hash + Eq> Default for RawLineMap<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Hash + Eq> RawLineMap<A> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, address: A, location: SourceLocation) {
        self.entries.insert(address, location);
    }

    pub fn get(&self, address: &A) -> Option<&SourceLocation> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&A, &SourceLocation)> {
        self.entries.iter()
    }

    /// Entries whose location is usable for correlation.
    pub fn resolved(&self) -> impl Iterator<Item = (&A, &SourceLocation)> {
        self.entries.iter().filter(|(_, loc)| loc.is_resolved())
    }

    /// Replace every reference to file `index` by the literal `path`. Returns how many
    /// entries were rewritten.
    pub fn rewrite_index(&mut self, index: u32, path: &str) -> usize {
        let mut count = 0;
        for loc in self.entries.values_mut() {
            if loc.file == FileRef::Index(index) {
                loc.file = FileRef::Path(path.to_string());
                count += 1;
            }
        }
        count
    }

    /// First file index still waiting for its table entry, if any.
    pub fn first_unresolved_index(&self) -> Option<u32> {
        self.entries.values().find_map(|loc| match loc.file {
            FileRef::Index(i) => Some(i),
            FileRef::Path(_) => None,
        })
    }
}

/// Running state of a listing scan.
///
/// `NoKernel` doubles as the "before kernel" sentinel: after a blank line ends a machine kernel
/// body, nothing is attributed to any kernel until the next section marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    NoKernel,
    NoSourceYet,
    InBody(SourceLocation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    OpenKernel,
    Annotate(SourceLocation),
    /// Blank line inside an intermediate body: forget the annotation, stay in the kernel.
    ClearAnnotation,
    /// Blank line after a machine body, or start of the intermediate file table.
    EndBody,
}

impl ScanState {
    pub fn step(self, event: ScanEvent) -> ScanState {
        match (self, event) {
            (_, ScanEvent::OpenKernel) => ScanState::NoSourceYet,
            (_, ScanEvent::EndBody) => ScanState::NoKernel,
            (ScanState::NoKernel, _) => ScanState::NoKernel,
            (_, ScanEvent::Annotate(loc)) => ScanState::InBody(loc),
            (_, ScanEvent::ClearAnnotation) => ScanState::NoSourceYet,
        }
    }

    pub fn in_kernel(&self) -> bool {
        !matches!(self, ScanState::NoKernel)
    }

    /// Location to attach to an instruction seen in this state.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            ScanState::NoKernel => None,
            ScanState::NoSourceYet => Some(SourceLocation::unknown()),
            ScanState::InBody(loc) => Some(loc.clone()),
        }
    }
}
