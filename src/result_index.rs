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

//! Per-kernel index over one loaded result set, and the handle that swaps it on reload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::aggregator::{
    aggregate_kernel, CorrelationMaps, FileLineRemap, SourceProvider, SyntheticSourceLine,
};
use crate::analysis::{AnalysisKind, AnalysisRecord};
use crate::assembly::{IntermediateLine, MachineLine};
use crate::error::Result;
use crate::highlight::BinaryAddress;
use crate::intermediate_asm::parse_intermediate_assembly;
use crate::machine_asm::parse_machine_assembly;
use crate::occurrence::Occurrence;
use crate::report::Report;
use crate::utils::{demangle_kernel_name, normalize_machine_address};

/// Everything one load needs, already read into memory.
#[derive(Debug, Clone, Default)]
pub struct ResultInputs {
    pub machine_assembly: String,
    pub intermediate_assembly: String,
    pub report_json: String,
    /// Source blobs keyed by their original (pre-rename) path.
    pub sources: HashMap<String, String>,
}

/// Resolves annotation paths through the report's rename table.
struct RenamedSources<'a> {
    report: &'a Report,
    blobs: &'a HashMap<String, String>,
}

impl SourceProvider for RenamedSources<'_> {
    fn source_text(&self, path: &str) -> Option<&str> {
        let Some(old) = self.report.original_path(path) else {
            warn!("{} is not in the file rename table", path);
            return None;
        };
        let text = self.blobs.get(old).map(String::as_str);
        if text.is_none() {
            warn!("No source blob for {} (renamed from {})", old, path);
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelIndex {
    pub name: String,
    pub display_name: String,
    pub machine_lines: Vec<MachineLine>,
    pub intermediate_lines: Vec<IntermediateLine>,
    pub source_lines: Vec<SyntheticSourceLine>,
    pub remap: FileLineRemap,
    pub maps: CorrelationMaps,
}

/// Immutable snapshot of one loaded result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultIndex {
    version: u64,
    kernels: IndexMap<String, KernelIndex>,
    report: Report,
}

impl ResultIndex {
    /// Parse and correlate a whole result set. Any structural error aborts the build.
    pub fn build(inputs: &ResultInputs, version: u64) -> Result<Self> {
        let now = Instant::now();
        let machine = parse_machine_assembly(&inputs.machine_assembly)?;
        let intermediate = parse_intermediate_assembly(&inputs.intermediate_assembly)?;
        let report = Report::parse(&inputs.report_json)?;
        let sources = RenamedSources {
            report: &report,
            blobs: &inputs.sources,
        };

        // Machine listing order first; kernels only present in the intermediate listing follow.
        let mut names: Vec<&str> = machine.kernel_names().collect();
        for name in intermediate.kernel_names() {
            if machine.kernel(name).is_none() {
                debug!("Kernel {} only appears in the intermediate listing", name);
                names.push(name);
            }
        }

        let mut kernels = IndexMap::new();
        for name in names {
            let m = machine.kernel(name);
            let i = intermediate.kernel(name);
            let aggregated = aggregate_kernel(
                m.map(|k| &k.raw_map),
                i.map(|k| &k.raw_map),
                &sources,
            )?;
            debug!(
                "Kernel {}: {} source lines, {} machine / {} intermediate addresses correlated",
                name,
                aggregated.source_lines.len(),
                aggregated.maps.machine_to_source.len(),
                aggregated.maps.intermediate_to_source.len()
            );
            kernels.insert(
                name.to_string(),
                KernelIndex {
                    name: name.to_string(),
                    display_name: demangle_kernel_name(name),
                    machine_lines: m.map(|k| k.lines.clone()).unwrap_or_default(),
                    intermediate_lines: i.map(|k| k.lines.clone()).unwrap_or_default(),
                    source_lines: aggregated.source_lines,
                    remap: aggregated.remap,
                    maps: aggregated.maps,
                },
            );
        }

        for (kind, per_kernel) in &report.analyses {
            for kernel in per_kernel.keys() {
                if !kernels.contains_key(kernel) {
                    warn!("Analysis {} reports kernel {} missing from the listings", kind, kernel);
                }
            }
        }

        info!(
            "Result set v{} indexed: {} kernels, {} analyses in {:.2?}",
            version,
            kernels.len(),
            report.analyses.len(),
            now.elapsed()
        );
        Ok(Self {
            version,
            kernels,
            report,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn kernel_names(&self) -> Vec<&str> {
        self.kernels.keys().map(String::as_str).collect()
    }

    pub fn kernel(&self, name: &str) -> Option<&KernelIndex> {
        self.kernels.get(name)
    }

    pub fn kernels(&self) -> impl Iterator<Item = &KernelIndex> {
        self.kernels.values()
    }

    pub fn analysis(&self, kind: AnalysisKind, kernel: &str) -> Option<&AnalysisRecord> {
        self.report.analysis(kind, kernel)
    }

    /// Analysis kinds present in the report.
    pub fn analysis_kinds(&self) -> Vec<AnalysisKind> {
        self.report.analyses.keys().copied().collect()
    }

    pub fn machine_to_source(&self, kernel: &str, address: &str) -> Option<u32> {
        let address = normalize_machine_address(address)?;
        self.kernel(kernel)?
            .maps
            .machine_to_source
            .get(&address)
            .copied()
    }

    pub fn intermediate_to_source(&self, kernel: &str, address: u32) -> Option<u32> {
        self.kernel(kernel)?
            .maps
            .intermediate_to_source
            .get(&address)
            .copied()
    }

    pub fn source_to_machine(&self, kernel: &str, line: u32) -> &[String] {
        self.kernel(kernel)
            .and_then(|k| k.maps.source_to_machine.get(&line))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn source_to_intermediate(&self, kernel: &str, line: u32) -> &[u32] {
        self.kernel(kernel)
            .and_then(|k| k.maps.source_to_intermediate.get(&line))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn source_lines(&self, kernel: &str) -> &[SyntheticSourceLine] {
        self.kernel(kernel)
            .map(|k| k.source_lines.as_slice())
            .unwrap_or(&[])
    }

    pub fn machine_lines(&self, kernel: &str) -> &[MachineLine] {
        self.kernel(kernel)
            .map(|k| k.machine_lines.as_slice())
            .unwrap_or(&[])
    }

    pub fn intermediate_lines(&self, kernel: &str) -> &[IntermediateLine] {
        self.kernel(kernel)
            .map(|k| k.intermediate_lines.as_slice())
            .unwrap_or(&[])
    }

    /// Synthetic line showing `file:line` in `kernel`, if that line is part of its excerpt.
    pub fn synthetic_line(&self, kernel: &str, file: &str, line: u32) -> Option<u32> {
        self.kernel(kernel)?.remap.get(file, line)
    }

    /// Synthetic source line of an occurrence, found through its binary address.
    pub fn occurrence_source_line(&self, kernel: &str, occurrence: &Occurrence) -> Option<u32> {
        match occurrence.binary_address()? {
            BinaryAddress::Machine(a) => self.machine_to_source(kernel, a),
            BinaryAddress::Intermediate(n) => self.intermediate_to_source(kernel, *n),
        }
    }

    pub fn occurrences_at_source_line(
        &self,
        kind: AnalysisKind,
        kernel: &str,
        line: u32,
    ) -> Vec<&Occurrence> {
        let Some(record) = self.analysis(kind, kernel) else {
            return Vec::new();
        };
        record
            .occurrences()
            .iter()
            .filter(|o| self.occurrence_source_line(kernel, o) == Some(line))
            .collect()
    }
}

/// Holds the current snapshot. A load builds a complete new index and only then replaces the
/// old one; a failed load leaves the previous snapshot in place.
pub struct IndexHandle {
    current: RwLock<Option<Arc<ResultIndex>>>,
    next_version: AtomicU64,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn load(&self, inputs: &ResultInputs) -> Result<Arc<ResultIndex>> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let index = Arc::new(ResultIndex::build(inputs, version)?);
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(index.clone());
        Ok(index)
    }

    pub fn current(&self) -> Option<Arc<ResultIndex>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
