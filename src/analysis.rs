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

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{IndexError, Result};
use crate::occurrence::Occurrence;

/// One named category of findings. The report keys its payloads by [`AnalysisKind::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnalysisKind {
    RegisterSpilling,
    LocalMemory,
    UncoalescedGlobal,
    SharedBankConflict,
    BranchDivergence,
    WarpStall,
    Fp64Usage,
    RedundantBarrier,
    DependencyStall,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 9] = [
        AnalysisKind::RegisterSpilling,
        AnalysisKind::LocalMemory,
        AnalysisKind::UncoalescedGlobal,
        AnalysisKind::SharedBankConflict,
        AnalysisKind::BranchDivergence,
        AnalysisKind::WarpStall,
        AnalysisKind::Fp64Usage,
        AnalysisKind::RedundantBarrier,
        AnalysisKind::DependencyStall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnalysisKind::RegisterSpilling => "register_spilling",
            AnalysisKind::LocalMemory => "local_memory",
            AnalysisKind::UncoalescedGlobal => "uncoalesced_global",
            AnalysisKind::SharedBankConflict => "shared_bank_conflict",
            AnalysisKind::BranchDivergence => "branch_divergence",
            AnalysisKind::WarpStall => "warp_stall",
            AnalysisKind::Fp64Usage => "fp64_usage",
            AnalysisKind::RedundantBarrier => "redundant_barrier",
            AnalysisKind::DependencyStall => "dependency_stall",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        AnalysisKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flatten a metrics object one level deep.
///
/// `{"a": null, "b": {"c": 1, "d": {"e": 2}}}` becomes `{"a": 0, "b/c": 1, "b/d": {"e": 2}}`.
pub fn flatten_metrics(metrics: &Map<String, Value>) -> IndexMap<String, Value> {
    let mut flat = IndexMap::new();
    for (key, value) in metrics {
        match value {
            Value::Null => {
                flat.insert(key.clone(), Value::from(0));
            }
            Value::Object(inner) => {
                for (inner_key, inner_value) in inner {
                    let v = if inner_value.is_null() {
                        Value::from(0)
                    } else {
                        inner_value.clone()
                    };
                    flat.insert(format!("{}/{}", key, inner_key), v);
                }
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

fn metric_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// Metrics and findings of one analysis kind for one kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub kind: AnalysisKind,
    metrics: IndexMap<String, Value>,
    occurrences: Vec<Occurrence>,
}

impl AnalysisRecord {
    /// Build from a `{"metrics": {...}, "occurrences": [...]}` payload. Both members are
    /// optional.
    pub fn from_payload(kind: AnalysisKind, payload: &Value) -> Result<Self> {
        let metrics = match payload.get("metrics") {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Object(m)) => flatten_metrics(m),
            Some(other) => {
                return Err(IndexError::MalformedReport(format!(
                    "{}: metrics must be an object, got {}",
                    kind, other
                )))
            }
        };
        let occurrences = match payload.get("occurrences") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| Occurrence::from_payload(kind, item))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(IndexError::MalformedReport(format!(
                    "{}: occurrences must be an array, got {}",
                    kind, other
                )))
            }
        };
        Ok(Self {
            kind,
            metrics,
            occurrences,
        })
    }

    /// Numeric value of a flattened metric. Absent or falsy metrics read as 0.
    pub fn get_metric(&self, name: &str) -> f64 {
        self.metrics.get(name).map(metric_number).unwrap_or(0.0)
    }

    pub fn metrics(&self) -> &IndexMap<String, Value> {
        &self.metrics
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_metrics_flatten_one_level() {
        let rec = AnalysisRecord::from_payload(
            AnalysisKind::UncoalescedGlobal,
            &json!({"metrics": {"memory_flow": {"l2_to_dram_bytes": 42}}}),
        )
        .unwrap();
        assert_eq!(rec.get_metric("memory_flow/l2_to_dram_bytes"), 42.0);
        assert_eq!(rec.get_metric("anything_else"), 0.0);
        assert_eq!(rec.get_metric("memory_flow"), 0.0);
    }

    #[test]
    fn falsy_and_deep_values_read_as_zero() {
        let m = json!({
            "none": null,
            "off": false,
            "on": true,
            "label": "sm_80",
            "ratio": 0.75,
            "outer": {"missing": null, "deeper": {"x": 1}}
        });
        let flat = flatten_metrics(m.as_object().unwrap());
        assert_eq!(flat["none"], json!(0));
        assert_eq!(flat["outer/missing"], json!(0));
        assert_eq!(flat["outer/deeper"], json!({"x": 1}));

        let rec = AnalysisRecord::from_payload(AnalysisKind::WarpStall, &json!({"metrics": m}))
            .unwrap();
        assert_eq!(rec.get_metric("none"), 0.0);
        assert_eq!(rec.get_metric("off"), 0.0);
        assert_eq!(rec.get_metric("on"), 1.0);
        assert_eq!(rec.get_metric("label"), 0.0);
        assert_eq!(rec.get_metric("ratio"), 0.75);
        assert_eq!(rec.get_metric("outer/deeper"), 0.0);
        assert_eq!(rec.get_metric("outer/deeper/x"), 0.0);
    }

    #[test]
    fn occurrences_keep_report_order() {
        let rec = AnalysisRecord::from_payload(
            AnalysisKind::RegisterSpilling,
            &json!({"occurrences": [
                {"line_number": 9, "pc_offset": "0x20", "register": "R1"},
                {"line_number": 3, "register": "R2"}
            ]}),
        )
        .unwrap();
        let lines: Vec<u32> = rec.occurrences().iter().map(|o| o.source_line_number()).collect();
        assert_eq!(lines, vec![9, 3]);
        assert!(rec.metrics().is_empty());
    }

    #[test]
    fn wrong_member_types_are_rejected() {
        assert!(AnalysisRecord::from_payload(AnalysisKind::WarpStall, &json!({"metrics": [1]}))
            .is_err());
        assert!(
            AnalysisRecord::from_payload(AnalysisKind::WarpStall, &json!({"occurrences": {}}))
                .is_err()
        );
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in AnalysisKind::ALL {
            assert_eq!(AnalysisKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(AnalysisKind::from_name("file_renames"), None);
    }
}
