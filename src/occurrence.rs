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

use serde_json::Value;

use crate::analysis::AnalysisKind;
use crate::error::{IndexError, Result};
use crate::findings::{constructor_for, Finding};
use crate::highlight::{BinaryAddress, HighlightMap};

fn decode_address(
    payload: &Value,
    field: &str,
    decode: fn(&Value) -> Option<BinaryAddress>,
) -> Result<Option<BinaryAddress>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode(value).map(Some).ok_or_else(|| {
            IndexError::MalformedReport(format!("{}: {} is not a valid address", field, value))
        }),
    }
}

/// Fields every occurrence payload shares.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceBase {
    pub source_line_number: u32,
    /// `None` when the payload names neither a machine nor an intermediate address; the
    /// occurrence is then listed but cannot be selected in either listing.
    pub binary_address: Option<BinaryAddress>,
    pub raw: Value,
}

impl OccurrenceBase {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(IndexError::MalformedReport(format!(
                "occurrence payload is not an object: {}",
                payload
            )));
        }
        let source_line_number = payload
            .get("line_number")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        // Each field belongs to one listing; the JSON value type never decides it.
        let machine = decode_address(payload, "pc_offset", BinaryAddress::machine_from_json)?;
        let binary_address = match machine {
            Some(address) => Some(address),
            None => decode_address(payload, "ptx_line", BinaryAddress::intermediate_from_json)?,
        };
        Ok(Self {
            source_line_number,
            binary_address,
            raw: payload.clone(),
        })
    }

    /// Where the finding is, for narrative text.
    pub fn site(&self) -> String {
        match &self.binary_address {
            Some(BinaryAddress::Machine(a)) => {
                format!("instruction {} (line {})", a, self.source_line_number)
            }
            Some(BinaryAddress::Intermediate(n)) => {
                format!("PTX statement {} (line {})", n, self.source_line_number)
            }
            None => format!("line {}", self.source_line_number),
        }
    }
}

/// Capability surface shared by every finding kind.
pub trait FindingDetails {
    fn title(&self) -> String;
    fn description(&self, base: &OccurrenceBase) -> String;
    fn recommendations(&self) -> String;

    /// Secondary addresses related to the finding (e.g. where a value was produced), in the
    /// occurrence's own listing.
    fn lines_to_highlight(&self, _base: &OccurrenceBase) -> Vec<BinaryAddress> {
        Vec::new()
    }

    fn tokens_to_highlight(&self, _base: &OccurrenceBase) -> HighlightMap {
        HighlightMap::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub base: OccurrenceBase,
    pub finding: Finding,
}

impl Occurrence {
    /// Build an occurrence for a payload reported under `kind`. The kind alone picks the
    /// constructor; the payload shape is never used to guess it.
    pub fn from_payload(kind: AnalysisKind, payload: &Value) -> Result<Self> {
        let base = OccurrenceBase::from_payload(payload)?;
        let finding = constructor_for(kind)(payload)?;
        Ok(Self { base, finding })
    }

    pub fn kind(&self) -> AnalysisKind {
        self.finding.kind()
    }

    pub fn source_line_number(&self) -> u32 {
        self.base.source_line_number
    }

    pub fn binary_address(&self) -> Option<&BinaryAddress> {
        self.base.binary_address.as_ref()
    }

    pub fn is_selectable(&self) -> bool {
        self.base.binary_address.is_some()
    }

    pub fn title(&self) -> String {
        self.finding.details().title()
    }

    pub fn description(&self) -> String {
        self.finding.details().description(&self.base)
    }

    pub fn recommendations(&self) -> String {
        self.finding.details().recommendations()
    }

    pub fn lines_to_highlight(&self) -> Vec<BinaryAddress> {
        self.finding.details().lines_to_highlight(&self.base)
    }

    pub fn tokens_to_highlight(&self) -> HighlightMap {
        self.finding.details().tokens_to_highlight(&self.base)
    }
}
