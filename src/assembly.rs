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

use indexmap::map::Entry;
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

use crate::line_info::{RawLineMap, SourceLocation};

/// Parsed assembly listings, grouped per kernel.
///
/// Both listings share this shape; only the address type differs. Machine listings are
/// addressed by the hex offset printed next to each instruction (`String`, `0x50` form),
/// intermediate listings by a 1-based statement counter (`u32`).
///
/// Lines keep their display order. Labels and directives are kept for display but carry no
/// address and therefore never take part in correlation.
#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
pub struct AssemblyLine<A> {
    pub address: Option<A>,
    pub tokens: Vec<String>,
}

impl<A> AssemblyLine<A> {
    pub fn new(address: Option<A>, tokens: Vec<String>) -> Self {
        Self { address, tokens }
    }

    pub fn is_instruction(&self) -> bool {
        self.address.is_some()
    }
}

pub type MachineLine = AssemblyLine<String>;
pub type IntermediateLine = AssemblyLine<u32>;

#[derive(Debug, Clone, PartialEq)]
pub struct KernelListing<A: Hash + Eq> {
    pub name: String,
    pub lines: Vec<AssemblyLine<A>>,
    pub raw_map: RawLineMap<A>,
    addr_map: BTreeMap<A, usize>, // address to index in lines
}

impl<A: Hash + Eq + Ord + Clone> KernelListing<A> {
    pub fn new(name: String) -> Self {
        Self {
            name,
            lines: Vec::new(),
            raw_map: RawLineMap::new(),
            addr_map: BTreeMap::new(),
        }
    }

    /// Append a display line without an address (label, directive, marker).
    pub fn push_plain(&mut self, tokens: Vec<String>) {
        self.lines.push(AssemblyLine::new(None, tokens));
    }

    /// Append an instruction and remember where it came from.
    pub fn push_instruction(&mut self, address: A, tokens: Vec<String>, location: SourceLocation) {
        self.addr_map.insert(address.clone(), self.lines.len());
        self.raw_map.insert(address.clone(), location);
        self.lines.push(AssemblyLine::new(Some(address), tokens));
    }

    pub fn get_line_by_addr(&self, address: &A) -> Option<&AssemblyLine<A>> {
        self.addr_map
            .get(address)
            .and_then(|&index| self.lines.get(index))
    }

    pub fn instruction_count(&self) -> usize {
        self.addr_map.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyListing<A: Hash + Eq> {
    pub kernels: IndexMap<String, KernelListing<A>>,
}

impl<A: Hash + Eq + Ord + Clone> Default for AssemblyListing<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Hash + Eq + Ord + Clone> AssemblyListing<A> {
    pub fn new() -> Self {
        Self {
            kernels: IndexMap::new(),
        }
    }

    /// Start (or restart) a kernel. A re-declared name replaces the earlier listing but keeps
    /// its first-seen position in the kernel order.
    pub fn open_kernel(&mut self, name: &str) -> &mut KernelListing<A> {
        if self.kernels.contains_key(name) {
            warn!("Kernel {} declared again; the later listing replaces the earlier one", name);
        }
        let fresh = KernelListing::new(name.to_string());
        match self.kernels.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(fresh);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(fresh),
        }
    }

    pub fn kernel(&self, name: &str) -> Option<&KernelListing<A>> {
        self.kernels.get(name)
    }

    pub fn kernel_mut(&mut self, name: &str) -> Option<&mut KernelListing<A>> {
        self.kernels.get_mut(name)
    }

    pub fn kernel_names(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }
}
