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

//! The nine finding kinds and the constructor for each analysis kind.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::analysis::AnalysisKind;
use crate::error::Result;
use crate::highlight::{add_highlight, BinaryAddress, Color, HighlightMap, LineSelector};
use crate::occurrence::{FindingDetails, OccurrenceBase};

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RegisterSpilling {
    pub register: String,
    pub spill_bytes: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LocalMemoryAccess {
    pub opcode: String,
    pub bytes: u64,
    pub is_store: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UncoalescedGlobalAccess {
    pub opcode: String,
    pub transactions_per_request: f64,
    pub ideal_transactions: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SharedBankConflict {
    pub opcode: String,
    pub ways: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct BranchDivergence {
    pub divergence_ratio: f64,
    pub predicate: String,
    /// String (machine) or integer (intermediate) address where the warp reconverges.
    pub reconvergence_pc: Value,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct WarpStall {
    pub reason: String,
    pub stall_ratio: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Fp64Usage {
    pub opcode: String,
    pub count: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RedundantBarrier {
    pub opcode: String,
}

impl Default for RedundantBarrier {
    fn default() -> Self {
        Self {
            opcode: "BAR.SYNC".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DependencyStall {
    pub register: String,
    /// Address of the instruction producing `register`.
    pub producer_pc: Value,
    pub latency_cycles: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    RegisterSpilling(RegisterSpilling),
    LocalMemoryAccess(LocalMemoryAccess),
    UncoalescedGlobalAccess(UncoalescedGlobalAccess),
    SharedBankConflict(SharedBankConflict),
    BranchDivergence(BranchDivergence),
    WarpStall(WarpStall),
    Fp64Usage(Fp64Usage),
    RedundantBarrier(RedundantBarrier),
    DependencyStall(DependencyStall),
}

impl Finding {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Finding::RegisterSpilling(_) => AnalysisKind::RegisterSpilling,
            Finding::LocalMemoryAccess(_) => AnalysisKind::LocalMemory,
            Finding::UncoalescedGlobalAccess(_) => AnalysisKind::UncoalescedGlobal,
            Finding::SharedBankConflict(_) => AnalysisKind::SharedBankConflict,
            Finding::BranchDivergence(_) => AnalysisKind::BranchDivergence,
            Finding::WarpStall(_) => AnalysisKind::WarpStall,
            Finding::Fp64Usage(_) => AnalysisKind::Fp64Usage,
            Finding::RedundantBarrier(_) => AnalysisKind::RedundantBarrier,
            Finding::DependencyStall(_) => AnalysisKind::DependencyStall,
        }
    }

    pub fn details(&self) -> &dyn FindingDetails {
        match self {
            Finding::RegisterSpilling(f) => f,
            Finding::LocalMemoryAccess(f) => f,
            Finding::UncoalescedGlobalAccess(f) => f,
            Finding::SharedBankConflict(f) => f,
            Finding::BranchDivergence(f) => f,
            Finding::WarpStall(f) => f,
            Finding::Fp64Usage(f) => f,
            Finding::RedundantBarrier(f) => f,
            Finding::DependencyStall(f) => f,
        }
    }
}

pub type Constructor = fn(&Value) -> Result<Finding>;

fn build<T: DeserializeOwned>(payload: &Value, wrap: fn(T) -> Finding) -> Result<Finding> {
    Ok(wrap(T::deserialize(payload)?))
}

/// Registered constructor for an analysis kind.
pub fn constructor_for(kind: AnalysisKind) -> Constructor {
    match kind {
        AnalysisKind::RegisterSpilling => |p| build(p, Finding::RegisterSpilling),
        AnalysisKind::LocalMemory => |p| build(p, Finding::LocalMemoryAccess),
        AnalysisKind::UncoalescedGlobal => |p| build(p, Finding::UncoalescedGlobalAccess),
        AnalysisKind::SharedBankConflict => |p| build(p, Finding::SharedBankConflict),
        AnalysisKind::BranchDivergence => |p| build(p, Finding::BranchDivergence),
        AnalysisKind::WarpStall => |p| build(p, Finding::WarpStall),
        AnalysisKind::Fp64Usage => |p| build(p, Finding::Fp64Usage),
        AnalysisKind::RedundantBarrier => |p| build(p, Finding::RedundantBarrier),
        AnalysisKind::DependencyStall => |p| build(p, Finding::DependencyStall),
    }
}

fn exact(base: &OccurrenceBase) -> Option<LineSelector> {
    base.binary_address.clone().map(LineSelector::Exact)
}

/// A related address, read in the same listing as the occurrence itself.
fn secondary(base: &OccurrenceBase, value: &Value) -> Option<BinaryAddress> {
    base.binary_address.as_ref()?.sibling_from_json(value)
}

impl FindingDetails for RegisterSpilling {
    fn title(&self) -> String {
        "Register spilling".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        let mut text = format!(
            "Register {} is spilled to local memory at {}.",
            self.register,
            base.site()
        );
        if self.spill_bytes > 0 {
            text += &format!(" The kernel spills {} bytes in total.", self.spill_bytes);
        }
        text
    }

    fn recommendations(&self) -> String {
        "Reduce register pressure: shorten live ranges, avoid large per-thread arrays, or raise \
         the register limit with __launch_bounds__ / -maxrregcount if occupancy allows."
            .to_string()
    }

    /// The spilled register is interesting everywhere up to the spill.
    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(address) = base.binary_address.clone() {
            add_highlight(&mut map, LineSelector::AtOrBefore(address), &self.register, Color::Red);
        }
        map
    }
}

impl FindingDetails for LocalMemoryAccess {
    fn title(&self) -> String {
        "Local memory access".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        let dir = if self.is_store { "stores" } else { "loads" };
        format!(
            "{} {} {} bytes through local memory at {}.",
            self.opcode, dir, self.bytes, base.site()
        )
    }

    fn recommendations(&self) -> String {
        if self.is_store {
            "Local stores usually come from register spills or dynamically indexed arrays; \
             make array indices compile-time constants or move the data to shared memory."
                .to_string()
        } else {
            "Local loads hit the L1/L2 hierarchy like global memory; keep the value in a \
             register or shared memory instead."
                .to_string()
        }
    }

    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, &self.opcode, Color::Orange);
        }
        map
    }
}

impl FindingDetails for UncoalescedGlobalAccess {
    fn title(&self) -> String {
        "Uncoalesced global memory access".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        format!(
            "{} at {} needs {:.1} transactions per request where {:.1} would suffice.",
            self.opcode,
            base.site(),
            self.transactions_per_request,
            self.ideal_transactions
        )
    }

    fn recommendations(&self) -> String {
        let ideal = if self.ideal_transactions > 0.0 {
            self.ideal_transactions
        } else {
            1.0
        };
        if self.transactions_per_request / ideal >= 4.0 {
            "Consecutive threads access addresses far apart. Restructure the data layout \
             (array of structures to structure of arrays) so a warp reads contiguous memory."
                .to_string()
        } else {
            "Align the accessed buffers and make the innermost index depend on threadIdx.x."
                .to_string()
        }
    }

    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, &self.opcode, Color::Orange);
        }
        map
    }
}

impl FindingDetails for SharedBankConflict {
    fn title(&self) -> String {
        "Shared memory bank conflict".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        format!(
            "{} at {} is replayed as a {}-way bank conflict.",
            self.opcode,
            base.site(),
            self.ways
        )
    }

    fn recommendations(&self) -> String {
        if self.ways >= 8 {
            "Threads of a warp hit the same bank with a large stride; pad the shared array \
             (e.g. [32][33] instead of [32][32]) or swizzle the index."
                .to_string()
        } else {
            "Check the shared memory index expression for strides that are a multiple of the \
             bank count."
                .to_string()
        }
    }

    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, &self.opcode, Color::Yellow);
        }
        map
    }
}

impl FindingDetails for BranchDivergence {
    fn title(&self) -> String {
        "Divergent branch".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        let mut text = format!(
            "The branch at {} diverges for {:.0}% of executions.",
            base.site(),
            self.divergence_ratio * 100.0
        );
        if let Some(target) = secondary(base, &self.reconvergence_pc) {
            text += &format!(" Threads reconverge at {}.", target);
        }
        text
    }

    fn recommendations(&self) -> String {
        "Make the branch condition uniform across a warp, e.g. by branching on warp-aligned \
         indices, or replace short branches with predicated/select code."
            .to_string()
    }

    fn lines_to_highlight(&self, base: &OccurrenceBase) -> Vec<BinaryAddress> {
        secondary(base, &self.reconvergence_pc).into_iter().collect()
    }

    /// The branch itself, and the guarding predicate wherever it is shown.
    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, "BRA", Color::Yellow);
        }
        if !self.predicate.is_empty() {
            let pred = self.predicate.trim_start_matches(['@', '!']);
            add_highlight(&mut map, LineSelector::All, &format!("@{}", pred), Color::Purple);
            add_highlight(&mut map, LineSelector::All, &format!("@!{}", pred), Color::Purple);
        }
        map
    }
}

impl FindingDetails for WarpStall {
    fn title(&self) -> String {
        "Warp stall".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        format!(
            "Warps spend {:.0}% of their cycles stalled on {} at {}.",
            self.stall_ratio * 100.0,
            if self.reason.is_empty() {
                "an unknown reason"
            } else {
                self.reason.as_str()
            },
            base.site()
        )
    }

    fn recommendations(&self) -> String {
        match self.reason.as_str() {
            "memory_dependency" | "long_scoreboard" => {
                "Increase memory-level parallelism: issue independent loads earlier and \
                 prefetch into shared memory."
            }
            "execution_dependency" | "short_scoreboard" => {
                "Interleave independent arithmetic so consecutive instructions do not wait on \
                 each other's results."
            }
            "synchronization" | "barrier" => {
                "Balance the work between barriers so warps do not idle at __syncthreads()."
            }
            _ => "Increase occupancy so the scheduler has other warps to issue from.",
        }
        .to_string()
    }
}

impl FindingDetails for Fp64Usage {
    fn title(&self) -> String {
        "Double precision arithmetic".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        format!(
            "{} at {} runs on the double precision units ({} executions).",
            self.opcode,
            base.site(),
            self.count
        )
    }

    fn recommendations(&self) -> String {
        "Use float literals (1.0f) and single precision math functions unless the extra \
         precision is required."
            .to_string()
    }

    /// Every use of the opcode in the listing is worth seeing.
    fn tokens_to_highlight(&self, _base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        add_highlight(&mut map, LineSelector::All, &self.opcode, Color::Red);
        map
    }
}

impl FindingDetails for RedundantBarrier {
    fn title(&self) -> String {
        "Redundant barrier".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        format!(
            "{} at {} does not order any shared memory access.",
            self.opcode,
            base.site()
        )
    }

    fn recommendations(&self) -> String {
        "Remove the barrier, or use __syncwarp() if only warp-level ordering is needed."
            .to_string()
    }

    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, &self.opcode, Color::Yellow);
        }
        map
    }
}

impl FindingDetails for DependencyStall {
    fn title(&self) -> String {
        "Dependency stall".to_string()
    }

    fn description(&self, base: &OccurrenceBase) -> String {
        let producer = secondary(base, &self.producer_pc)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "an earlier instruction".to_string());
        format!(
            "The instruction at {} waits {} cycles for {} produced by {}.",
            base.site(),
            self.latency_cycles,
            self.register,
            producer
        )
    }

    fn recommendations(&self) -> String {
        if self.latency_cycles > 100 {
            "The producer is a memory load; move it earlier or overlap it with independent \
             work."
                .to_string()
        } else {
            "Reorder independent instructions between the producer and the consumer.".to_string()
        }
    }

    fn lines_to_highlight(&self, base: &OccurrenceBase) -> Vec<BinaryAddress> {
        secondary(base, &self.producer_pc).into_iter().collect()
    }

    fn tokens_to_highlight(&self, base: &OccurrenceBase) -> HighlightMap {
        let mut map = HighlightMap::new();
        if let Some(producer) = secondary(base, &self.producer_pc) {
            add_highlight(&mut map, LineSelector::AtOrAfter(producer), &self.register, Color::Blue);
        }
        if let Some(sel) = exact(base) {
            add_highlight(&mut map, sel, &self.register, Color::Red);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::Occurrence;
    use serde_json::json;

    #[test]
    fn register_spill_highlights_up_to_the_spill() {
        let occ = Occurrence::from_payload(
            AnalysisKind::RegisterSpilling,
            &json!({"line_number": 10, "pc_offset": "0x50", "register": "R4"}),
        )
        .unwrap();
        assert_eq!(occ.source_line_number(), 10);
        assert_eq!(occ.kind(), AnalysisKind::RegisterSpilling);
        let tokens = occ.tokens_to_highlight();
        assert_eq!(tokens["<=0x50"].get("R4"), Some(&Color::Red));
        assert!(occ.description().contains("R4"));
    }

    #[test]
    fn every_kind_has_a_constructor() {
        for kind in AnalysisKind::ALL {
            let occ = Occurrence::from_payload(kind, &json!({"line_number": 1})).unwrap();
            assert_eq!(occ.kind(), kind);
            assert!(!occ.title().is_empty());
            assert!(!occ.recommendations().is_empty());
        }
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let err = Occurrence::from_payload(
            AnalysisKind::SharedBankConflict,
            &json!({"line_number": 1, "ways": "many"}),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::IndexError::MalformedReport(_)));
    }

    #[test]
    fn branch_divergence_secondary_lines_stay_in_own_listing() {
        let occ = Occurrence::from_payload(
            AnalysisKind::BranchDivergence,
            &json!({"line_number": 4, "pc_offset": "0x80", "reconvergence_pc": "0x00c0",
                    "predicate": "P0", "divergence_ratio": 0.5}),
        )
        .unwrap();
        assert_eq!(
            occ.lines_to_highlight(),
            vec![BinaryAddress::Machine("0xc0".into())]
        );
        let tokens = occ.tokens_to_highlight();
        assert_eq!(tokens["0x80"].get("BRA"), Some(&Color::Yellow));
        assert!(tokens["*"].contains_key("@P0"));
        assert!(tokens["*"].contains_key("@!P0"));

        let ptx = Occurrence::from_payload(
            AnalysisKind::BranchDivergence,
            &json!({"line_number": 4, "ptx_line": 12, "reconvergence_pc": "0xc0"}),
        )
        .unwrap();
        assert!(ptx.lines_to_highlight().is_empty());
    }

    #[test]
    fn recommendations_branch_on_fields() {
        let heavy = Occurrence::from_payload(
            AnalysisKind::SharedBankConflict,
            &json!({"line_number": 1, "ways": 16}),
        )
        .unwrap();
        let light = Occurrence::from_payload(
            AnalysisKind::SharedBankConflict,
            &json!({"line_number": 1, "ways": 2}),
        )
        .unwrap();
        assert_ne!(heavy.recommendations(), light.recommendations());

        let stall = Occurrence::from_payload(
            AnalysisKind::WarpStall,
            &json!({"line_number": 1, "reason": "barrier", "stall_ratio": 0.25}),
        )
        .unwrap();
        assert!(stall.recommendations().contains("__syncthreads"));
        assert!(stall.description().contains("25%"));
    }

    #[test]
    fn dependency_stall_marks_producer_onwards() {
        let occ = Occurrence::from_payload(
            AnalysisKind::DependencyStall,
            &json!({"line_number": 7, "pc_offset": "0x90", "producer_pc": "0x40",
                    "register": "R6", "latency_cycles": 400}),
        )
        .unwrap();
        let tokens = occ.tokens_to_highlight();
        assert_eq!(tokens[">=0x40"].get("R6"), Some(&Color::Blue));
        assert_eq!(tokens["0x90"].get("R6"), Some(&Color::Red));
        assert_eq!(occ.lines_to_highlight(), vec![BinaryAddress::Machine("0x40".into())]);
    }

    #[test]
    fn related_addresses_follow_the_occurrence_listing() {
        let sass = Occurrence::from_payload(
            AnalysisKind::DependencyStall,
            &json!({"line_number": 7, "pc_offset": "0x90", "producer_pc": 64, "register": "R6"}),
        )
        .unwrap();
        assert_eq!(sass.lines_to_highlight(), vec![BinaryAddress::Machine("0x40".into())]);
        assert!(sass.tokens_to_highlight().contains_key(">=0x40"));

        let ptx = Occurrence::from_payload(
            AnalysisKind::DependencyStall,
            &json!({"line_number": 7, "ptx_line": 9, "producer_pc": "5", "register": "%r4"}),
        )
        .unwrap();
        assert_eq!(ptx.lines_to_highlight(), vec![BinaryAddress::Intermediate(5)]);
        assert!(ptx.description().ends_with("produced by 5."));
        assert_eq!(ptx.tokens_to_highlight()[">=5"].get("%r4"), Some(&Color::Blue));

        let loose = Occurrence::from_payload(
            AnalysisKind::DependencyStall,
            &json!({"line_number": 7, "producer_pc": 5, "register": "R6"}),
        )
        .unwrap();
        assert!(loose.lines_to_highlight().is_empty());
        assert!(loose.description().contains("an earlier instruction"));
    }

    #[test]
    fn barrier_defaults_opcode() {
        let occ = Occurrence::from_payload(
            AnalysisKind::RedundantBarrier,
            &json!({"line_number": 2, "pc_offset": "0x10"}),
        )
        .unwrap();
        assert!(occ.tokens_to_highlight()["0x10"].contains_key("BAR.SYNC"));
    }
}
