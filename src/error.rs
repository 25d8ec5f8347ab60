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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Failures that abort a whole load. Lookups on a built index never produce these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Malformed directive at line {line}: {text}")]
    MalformedDirective { line: usize, text: String },

    #[error("Unresolved file {file}: {detail}")]
    UnresolvedFile { file: String, detail: String },

    #[error("Malformed report: {0}")]
    MalformedReport(String),
}

impl IndexError {
    pub fn malformed_directive(line: usize, text: &str) -> Self {
        IndexError::MalformedDirective {
            line,
            text: text.trim().to_string(),
        }
    }

    pub fn unresolved(file: impl Into<String>, detail: impl Into<String>) -> Self {
        IndexError::UnresolvedFile {
            file: file.into(),
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::MalformedReport(e.to_string())
    }
}
