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

//! Machine assembly (SASS, as printed by `nvdisasm -g`) parser.
//!
//! The listing looks like:
//!
//! ```text
//!     .section .text._Z3addPiS_S_,"ax",@progbits
//! .text._Z3addPiS_S_:
//!     //## File "/src/add.cu", line 10
//!     /*0000*/    MOV R1, c[0x0][0x28] ;     /* 0x00000a0000017a02 */
//! .L_x_0:
//!     /*0010*/    EXIT ;
//! ```
//!
//! Each `//## File` comment applies to the instructions that follow it until the next comment
//! or a blank line. A blank line or any non-text `.section` closes the kernel body, so trailing
//! sections (constant banks, symbol tables) are never attributed to the last kernel.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::assembly::AssemblyListing;
use crate::error::{IndexError, Result};
use crate::line_info::{ScanEvent, ScanState, SourceLocation};
use crate::tokens::tokenize_assembly;
use crate::utils::normalize_machine_address;

struct Patterns {
    section: Regex,
    any_section: Regex,
    debug_comment: Regex,
    address: Regex,
    block_comment: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        section: Regex::new(r"^\s*\.section\s+\.text\.([^,\s]+)").unwrap(),
        any_section: Regex::new(r"^\s*\.section\s").unwrap(),
        debug_comment: Regex::new(r#"^\s*//##\s*File\s+"([^"]*)"\s*,\s*line\s+(\d+)"#).unwrap(),
        address: Regex::new(r"^\s*/\*([0-9a-fA-F]+)\*/").unwrap(),
        block_comment: Regex::new(r"/\*.*?\*/").unwrap(),
    })
}

/// Kernel name if `line` opens a kernel text section.
pub fn section_kernel(line: &str) -> Option<&str> {
    patterns()
        .section
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Location carried by a `//## File "...", line N` comment.
///
/// Returns `Ok(None)` for lines that are not debug comments and an error for a debug comment
/// missing its path or line number.
pub fn debug_location(line: &str, line_no: usize) -> Result<Option<SourceLocation>> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("//##") {
        return Ok(None);
    }
    let caps = patterns()
        .debug_comment
        .captures(line)
        .ok_or_else(|| IndexError::malformed_directive(line_no, line))?;
    let line_num: u32 = caps[2]
        .parse()
        .map_err(|_| IndexError::malformed_directive(line_no, line))?;
    Ok(Some(SourceLocation::new(&caps[1], line_num)))
}

fn instruction_address(line: &str) -> Option<String> {
    patterns()
        .address
        .captures(line)
        .and_then(|c| normalize_machine_address(&c[1]))
}

fn strip_block_comments(line: &str) -> String {
    patterns().block_comment.replace_all(line, " ").into_owned()
}

fn is_label(line: &str) -> bool {
    line.trim_end().ends_with(':')
}

pub fn parse_machine_assembly(text: &str) -> Result<AssemblyListing<String>> {
    let mut listing = AssemblyListing::new();
    let mut current: Option<String> = None;
    let mut state = ScanState::NoKernel;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            state = state.step(ScanEvent::EndBody);
            continue;
        }

        if let Some(name) = section_kernel(line) {
            debug!("Machine listing: kernel {} at line {}", name, idx + 1);
            listing.open_kernel(name).push_plain(tokenize_assembly(line));
            current = Some(name.to_string());
            state = state.step(ScanEvent::OpenKernel);
            continue;
        }

        if patterns().any_section.is_match(line) {
            debug!("Machine listing: non-text section at line {}", idx + 1);
            state = state.step(ScanEvent::EndBody);
            continue;
        }

        if let Some(loc) = debug_location(line, idx + 1)? {
            state = state.step(ScanEvent::Annotate(loc));
            continue;
        }

        let Some(location) = state.location() else {
            continue;
        };
        let Some(kernel) = current.as_deref().and_then(|k| listing.kernel_mut(k)) else {
            continue;
        };

        let tokens = tokenize_assembly(&strip_block_comments(line));
        match instruction_address(line) {
            Some(address) if !is_label(line) => kernel.push_instruction(address, tokens, location),
            _ => kernel.push_plain(tokens),
        }
    }

    debug!(
        "Machine listing parsed: {} kernels",
        listing.kernels.len()
    );
    Ok(listing)
}
