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

use serde::Serialize;

use crate::analysis::AnalysisKind;
use crate::highlight::{resolve_highlights, BinaryAddress, Color, HighlightMap};
use crate::occurrence::Occurrence;
use crate::result_index::{KernelIndex, ResultIndex};

// JSON views handed to the front end. Field names are camelCase; machine addresses are always
// `0x`-prefixed hex strings and intermediate addresses plain integers, so a consumer can tell the
// listings apart without a tag.

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct KernelSummary {
    pub name: String,
    /// Demangled name, or `name` if it is not a mangled C++ symbol.
    pub display_name: String,
    pub machine_instructions: usize,
    pub intermediate_instructions: usize,
    pub source_lines: usize,
    /// Contributing source files in first-referenced order.
    pub files: Vec<String>,
    /// Analysis kinds that report this kernel.
    pub analyses: Vec<String>,
}

impl KernelSummary {
    pub fn new(index: &ResultIndex, kernel: &KernelIndex) -> Self {
        let analyses = index
            .analysis_kinds()
            .into_iter()
            .filter(|kind| index.analysis(*kind, &kernel.name).is_some())
            .map(|kind| kind.name().to_string())
            .collect();
        Self {
            name: kernel.name.clone(),
            display_name: kernel.display_name.clone(),
            machine_instructions: kernel.machine_lines.iter().filter(|l| l.is_instruction()).count(),
            intermediate_instructions: kernel
                .intermediate_lines
                .iter()
                .filter(|l| l.is_instruction())
                .count(),
            source_lines: kernel.source_lines.len(),
            files: kernel.remap.files().map(str::to_string).collect(),
            analyses,
        }
    }

    pub fn all(index: &ResultIndex) -> Vec<Self> {
        index.kernels().map(|k| Self::new(index, k)).collect()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SourceOrigin {
    pub file: String,
    pub line: u32,
}

/// Everything linked to one synthetic source line.
#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct LineCorrelation {
    pub kernel: String,
    pub source_line: Option<u32>,
    pub origin: Option<SourceOrigin>,
    pub text: Option<String>,
    pub machine_addresses: Vec<String>,
    pub intermediate_addresses: Vec<u32>,
}

impl LineCorrelation {
    pub fn for_source_line(index: &ResultIndex, kernel: &str, line: u32) -> Self {
        let k = index.kernel(kernel);
        let origin = k.and_then(|k| k.remap.origin(line)).map(|(file, line)| SourceOrigin {
            file: file.to_string(),
            line,
        });
        let text = index
            .source_lines(kernel)
            .iter()
            .find(|l| l.address == line)
            .map(|l| l.text());
        Self {
            kernel: kernel.to_string(),
            source_line: text.as_ref().map(|_| line),
            origin,
            text,
            machine_addresses: index.source_to_machine(kernel, line).to_vec(),
            intermediate_addresses: index.source_to_intermediate(kernel, line).to_vec(),
        }
    }

    /// Correlation seen from an assembly address; unannotated addresses give an empty view.
    pub fn for_address(index: &ResultIndex, kernel: &str, address: &BinaryAddress) -> Self {
        let line = match address {
            BinaryAddress::Machine(a) => index.machine_to_source(kernel, a),
            BinaryAddress::Intermediate(n) => index.intermediate_to_source(kernel, *n),
        };
        match line {
            Some(line) => Self::for_source_line(index, kernel, line),
            None => Self {
                kernel: kernel.to_string(),
                source_line: None,
                origin: None,
                text: None,
                machine_addresses: Vec::new(),
                intermediate_addresses: Vec::new(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct HighlightedLine {
    /// Position in the listing the occurrence's address belongs to.
    pub index: usize,
    pub tokens: BTreeMap<String, Color>,
}

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceView {
    pub kind: String,
    pub title: String,
    pub description: String,
    pub recommendations: String,
    pub source_line_number: u32,
    pub binary_address: Option<String>,
    pub synthetic_line: Option<u32>,
    pub selectable: bool,
    pub lines_to_highlight: Vec<String>,
    pub tokens_to_highlight: HighlightMap,
    pub highlighted_lines: Vec<HighlightedLine>,
}

fn displayed_addresses(
    index: &ResultIndex,
    kernel: &str,
    own: &BinaryAddress,
) -> Vec<Option<BinaryAddress>> {
    match own {
        BinaryAddress::Machine(_) => index
            .machine_lines(kernel)
            .iter()
            .map(|l| l.address.as_ref().map(|a| BinaryAddress::Machine(a.clone())))
            .collect(),
        BinaryAddress::Intermediate(_) => index
            .intermediate_lines(kernel)
            .iter()
            .map(|l| l.address.map(BinaryAddress::Intermediate))
            .collect(),
    }
}

impl OccurrenceView {
    pub fn new(index: &ResultIndex, kernel: &str, occurrence: &Occurrence) -> Self {
        let tokens = occurrence.tokens_to_highlight();
        let highlighted_lines = match occurrence.binary_address() {
            Some(own) => resolve_highlights(&tokens, &displayed_addresses(index, kernel, own))
                .into_iter()
                .map(|(index, tokens)| HighlightedLine { index, tokens })
                .collect(),
            None => Vec::new(),
        };
        Self {
            kind: occurrence.kind().name().to_string(),
            title: occurrence.title(),
            description: occurrence.description(),
            recommendations: occurrence.recommendations(),
            source_line_number: occurrence.source_line_number(),
            binary_address: occurrence.binary_address().map(|a| a.to_string()),
            synthetic_line: index.occurrence_source_line(kernel, occurrence),
            selectable: occurrence.is_selectable(),
            lines_to_highlight: occurrence
                .lines_to_highlight()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            tokens_to_highlight: tokens,
            highlighted_lines,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct MetricView {
    pub name: String,
    pub value: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    pub kind: String,
    pub kernel: String,
    pub metrics: Vec<MetricView>,
    pub occurrences: Vec<OccurrenceView>,
}

impl AnalysisView {
    pub fn new(index: &ResultIndex, kind: AnalysisKind, kernel: &str) -> Option<Self> {
        let record = index.analysis(kind, kernel)?;
        Some(Self {
            kind: kind.name().to_string(),
            kernel: kernel.to_string(),
            metrics: record
                .metrics()
                .keys()
                .map(|name| MetricView {
                    name: name.clone(),
                    value: record.get_metric(name),
                })
                .collect(),
            occurrences: record
                .occurrences()
                .iter()
                .map(|o| OccurrenceView::new(index, kernel, o))
                .collect(),
        })
    }

    /// Every analysis reported for `kernel`, in report order.
    pub fn for_kernel(index: &ResultIndex, kernel: &str) -> Vec<Self> {
        index
            .analysis_kinds()
            .into_iter()
            .filter_map(|kind| Self::new(index, kind, kernel))
            .collect()
    }

    /// Occurrences of `kind` whose address lands on synthetic `line`.
    pub fn at_source_line(
        index: &ResultIndex,
        kind: AnalysisKind,
        kernel: &str,
        line: u32,
    ) -> Vec<OccurrenceView> {
        index
            .occurrences_at_source_line(kind, kernel, line)
            .into_iter()
            .map(|o| OccurrenceView::new(index, kernel, o))
            .collect()
    }
}
