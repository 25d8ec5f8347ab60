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

//! Performance report JSON.
//!
//! ```json
//! {
//!   "file_renames": { "/build/a.cu": "/home/me/a.cu" },
//!   "register_spilling": {
//!     "_Z3addPiS_S_": { "metrics": { ... }, "occurrences": [ ... ] }
//!   }
//! }
//! ```
//!
//! Paths in the debug annotations are the "new" paths; the old path is where the source blob
//! is filed.

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;

use crate::analysis::{AnalysisKind, AnalysisRecord};
use crate::error::{IndexError, Result};
use crate::utils::normalize_source_path;

pub const FILE_RENAMES_KEY: &str = "file_renames";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// new path → old path
    pub file_renames: IndexMap<String, String>,
    pub analyses: IndexMap<AnalysisKind, IndexMap<String, AnalysisRecord>>,
}

impl Report {
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let Value::Object(root) = root else {
            return Err(IndexError::MalformedReport(
                "top level must be an object".to_string(),
            ));
        };

        let mut report = Report::default();
        for (key, value) in &root {
            if key == FILE_RENAMES_KEY {
                report.file_renames = parse_renames(value)?;
                continue;
            }
            let Some(kind) = AnalysisKind::from_name(key) else {
                warn!("Skipping unknown analysis kind {}", key);
                continue;
            };
            let Value::Object(per_kernel) = value else {
                return Err(IndexError::MalformedReport(format!(
                    "{}: expected kernel → payload object",
                    key
                )));
            };
            let mut records = IndexMap::new();
            for (kernel, payload) in per_kernel {
                records.insert(kernel.clone(), AnalysisRecord::from_payload(kind, payload)?);
            }
            debug!("Analysis {}: {} kernels", kind, records.len());
            report.analyses.insert(kind, records);
        }
        Ok(report)
    }

    /// Old path for a path found in the debug annotations.
    pub fn original_path(&self, path: &str) -> Option<&str> {
        self.file_renames
            .get(path)
            .or_else(|| self.file_renames.get(&normalize_source_path(path)))
            .map(String::as_str)
    }

    pub fn analysis(&self, kind: AnalysisKind, kernel: &str) -> Option<&AnalysisRecord> {
        self.analyses.get(&kind).and_then(|k| k.get(kernel))
    }
}

fn parse_renames(value: &Value) -> Result<IndexMap<String, String>> {
    let Value::Object(map) = value else {
        return Err(IndexError::MalformedReport(format!(
            "{} must be an object",
            FILE_RENAMES_KEY
        )));
    };
    map.iter()
        .map(|(new_path, old_path)| match old_path.as_str() {
            Some(old) => Ok((normalize_source_path(new_path), old.to_string())),
            None => Err(IndexError::MalformedReport(format!(
                "{}: old path for {} is not a string",
                FILE_RENAMES_KEY, new_path
            ))),
        })
        .collect()
}
