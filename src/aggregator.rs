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

//! Builds the per-kernel synthetic source space.
//!
//! A kernel usually touches a handful of lines spread over several files (the kernel body, inlined
//! device functions from headers). Instead of showing whole files we stitch together, per file,
//! the span between the first and last referenced line (plus one line of leading context), in the
//! order the files are first referenced. Every included physical line gets the next synthetic
//! line number and each file span is followed by one blank separator line:
//!
//! ```text
//!   1  a.cu:9        (context)
//!   2  a.cu:10
//!   3  a.cu:11
//!   4                (separator)
//!   5  util.cuh:3    (context)
//!   6  util.cuh:4
//!   7                (separator)
//! ```
//!
//! Both assembly raw maps are then rewritten from (file, line) to synthetic line numbers and
//! inverted.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use indexmap::IndexMap;
use log::debug;
use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::line_info::RawLineMap;
use crate::tokens::tokenize_source;

/// Access to source file contents, keyed by the path spelled in the debug annotations.
pub trait SourceProvider {
    fn source_text(&self, path: &str) -> Option<&str>;
}

impl SourceProvider for HashMap<String, String> {
    fn source_text(&self, path: &str) -> Option<&str> {
        self.get(path).map(String::as_str)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyntheticSourceLine {
    pub address: u32,
    pub tokens: Vec<String>,
}

impl SyntheticSourceLine {
    pub fn is_separator(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn text(&self) -> String {
        self.tokens.concat()
    }
}

/// (file, physical line) → synthetic line for one kernel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileLineRemap {
    files: IndexMap<String, BTreeMap<u32, u32>>,
}

impl FileLineRemap {
    pub fn get(&self, file: &str, line: u32) -> Option<u32> {
        self.files.get(file).and_then(|lines| lines.get(&line)).copied()
    }

    /// Contributing files in first-referenced order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Inverse lookup: which (file, physical line) a synthetic line shows.
    pub fn origin(&self, synthetic: u32) -> Option<(&str, u32)> {
        self.files.iter().find_map(|(file, lines)| {
            lines
                .iter()
                .find(|(_, s)| **s == synthetic)
                .map(|(&physical, _)| (file.as_str(), physical))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMaps {
    pub machine_to_source: IndexMap<String, u32>,
    pub intermediate_to_source: IndexMap<u32, u32>,
    pub source_to_machine: BTreeMap<u32, Vec<String>>,
    pub source_to_intermediate: BTreeMap<u32, Vec<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedKernel {
    pub source_lines: Vec<SyntheticSourceLine>,
    pub remap: FileLineRemap,
    pub maps: CorrelationMaps,
}

/// Referenced line span of one file.
struct Span {
    min: u32,
    max: u32,
}

fn collect_spans<A: Hash + Eq>(map: &RawLineMap<A>, spans: &mut IndexMap<String, Span>) {
    for (_, loc) in map.resolved() {
        let Some(path) = loc.path() else { continue };
        spans
            .entry(path.to_string())
            .and_modify(|s| {
                s.min = s.min.min(loc.line);
                s.max = s.max.max(loc.line);
            })
            .or_insert(Span {
                min: loc.line,
                max: loc.line,
            });
    }
}

fn rewrite<A: Hash + Eq + Clone>(
    map: &RawLineMap<A>,
    remap: &FileLineRemap,
) -> Result<(IndexMap<A, u32>, BTreeMap<u32, Vec<A>>)> {
    let mut forward = IndexMap::new();
    let mut inverse: BTreeMap<u32, Vec<A>> = BTreeMap::new();
    for (address, loc) in map.resolved() {
        let path = loc.path().unwrap_or_default();
        let synthetic = remap.get(path, loc.line).ok_or_else(|| {
            IndexError::unresolved(
                path,
                format!("line {} is outside the file's included range", loc.line),
            )
        })?;
        forward.insert(address.clone(), synthetic);
        inverse.entry(synthetic).or_default().push(address.clone());
    }
    Ok((forward, inverse))
}

/// Build the synthetic source space and correlation maps for one kernel.
///
/// Either raw map may be missing (a kernel present in only one listing).
pub fn aggregate_kernel(
    machine: Option<&RawLineMap<String>>,
    intermediate: Option<&RawLineMap<u32>>,
    sources: &dyn SourceProvider,
) -> Result<AggregatedKernel> {
    let mut spans: IndexMap<String, Span> = IndexMap::new();
    if let Some(map) = machine {
        collect_spans(map, &mut spans);
    }
    if let Some(map) = intermediate {
        collect_spans(map, &mut spans);
    }

    let mut source_lines = Vec::new();
    let mut remap = FileLineRemap::default();
    let mut next: u32 = 1;

    for (file, span) in &spans {
        let text = sources
            .source_text(file)
            .ok_or_else(|| IndexError::unresolved(file.as_str(), "no source text available"))?;
        let physical: Vec<&str> = text.lines().collect();
        let min_line = span.min.saturating_sub(1).max(1);
        let max_line = (physical.len() as u32).min(span.max);

        let table = remap.files.entry(file.clone()).or_default();
        for line_no in min_line..=max_line {
            let content = physical[(line_no - 1) as usize];
            table.insert(line_no, next);
            source_lines.push(SyntheticSourceLine {
                address: next,
                tokens: tokenize_source(content),
            });
            next += 1;
        }
        // One separator after every file, the last one included.
        source_lines.push(SyntheticSourceLine {
            address: next,
            tokens: Vec::new(),
        });
        next += 1;
        debug!(
            "{}: lines {}..={} included ({} referenced)",
            file, min_line, max_line, span.max
        );
    }

    let mut maps = CorrelationMaps::default();
    if let Some(map) = machine {
        let (forward, inverse) = rewrite(map, &remap)?;
        maps.machine_to_source = forward;
        maps.source_to_machine = inverse;
    }
    if let Some(map) = intermediate {
        let (forward, inverse) = rewrite(map, &remap)?;
        maps.intermediate_to_source = forward;
        maps.source_to_intermediate = inverse;
    }

    Ok(AggregatedKernel {
        source_lines,
        remap,
        maps,
    })
}
