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

//! Intermediate assembly (PTX) parser.
//!
//! Source positions come from `.loc <file> <line> <col>` directives whose file is an index into
//! a `.file <index> "<path>"` table. nvcc emits that table after the kernels, so locations are
//! first recorded against the bare index and rewritten once the entry shows up.

use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;

use crate::assembly::AssemblyListing;
use crate::error::{IndexError, Result};
use crate::line_info::{FileRef, FileTable, ScanEvent, ScanState, SourceLocation};
use crate::tokens::tokenize_assembly;

struct Patterns {
    entry: Regex,
    file: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        entry: Regex::new(r"(^|\s)\.entry(\s|$)").unwrap(),
        file: Regex::new(r#"^\s*\.file\s+(\d+)\s+"([^"]*)""#).unwrap(),
    })
}

fn is_directive(line: &str, name: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix(name) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Kernel name declared by an `.entry` line: the token right before the parameter list.
pub fn entry_kernel(line: &str) -> Option<&str> {
    if !patterns().entry.is_match(line) {
        return None;
    }
    let head = match line.find('(') {
        Some(pos) => &line[..pos],
        None => line,
    };
    head.split_whitespace()
        .last()
        .filter(|name| *name != ".entry")
}

/// Parse the operands of a `.loc` directive into (file index, line).
pub fn parse_loc(line: &str, line_no: usize) -> Result<(u32, u32)> {
    let malformed = || IndexError::malformed_directive(line_no, line);
    let operands: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if operands.len() < 3 {
        return Err(malformed());
    }
    let file = operands[1].parse::<u32>().map_err(|_| malformed())?;
    let src_line = operands[2].parse::<u32>().map_err(|_| malformed())?;
    Ok((file, src_line))
}

/// Parse a `.file` directive into (index, path).
pub fn parse_file(line: &str, line_no: usize) -> Result<(u32, String)> {
    let malformed = || IndexError::malformed_directive(line_no, line);
    let caps = patterns().file.captures(line).ok_or_else(malformed)?;
    let index = caps[1].parse::<u32>().map_err(|_| malformed())?;
    Ok((index, caps[2].to_string()))
}

fn is_label(line: &str) -> bool {
    line.trim_end().ends_with(':')
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

/// Brace nesting of the current kernel body.
#[derive(Debug, Default)]
struct BraceDepth {
    depth: usize,
    opened: bool,
}

impl BraceDepth {
    /// Account for the braces on `line`; true once the outermost body brace is closed.
    fn closes(&mut self, line: &str) -> bool {
        let code = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        for c in code.chars() {
            match c {
                '{' => {
                    self.depth += 1;
                    self.opened = true;
                }
                '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }
        self.opened && self.depth == 0
    }
}

pub fn parse_intermediate_assembly(text: &str) -> Result<AssemblyListing<u32>> {
    let mut listing: AssemblyListing<u32> = AssemblyListing::new();
    let mut files = FileTable::new();
    let mut current: Option<String> = None;
    let mut next_address: u32 = 1;
    let mut state = ScanState::NoKernel;
    let mut braces = BraceDepth::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        let line_no = idx + 1;

        if line.trim().is_empty() {
            state = state.step(ScanEvent::ClearAnnotation);
            continue;
        }

        if let Some(name) = entry_kernel(line) {
            debug!("Intermediate listing: kernel {} at line {}", name, line_no);
            listing.open_kernel(name).push_plain(tokenize_assembly(line));
            current = Some(name.to_string());
            next_address = 1;
            braces = BraceDepth::default();
            state = state.step(ScanEvent::OpenKernel);
            if braces.closes(line) {
                state = state.step(ScanEvent::EndBody);
            }
            continue;
        }

        if is_directive(line, ".file") {
            let (index, path) = parse_file(line, line_no)?;
            let path = files.add_file(index, &path);
            let rewritten: usize = listing
                .kernels
                .values_mut()
                .map(|k| k.raw_map.rewrite_index(index, &path))
                .sum();
            debug!("File #{} -> {} ({} locations rewritten)", index, path, rewritten);
            state = state.step(ScanEvent::EndBody);
            continue;
        }

        if !state.in_kernel() {
            continue;
        }

        if is_directive(line, ".loc") {
            let (index, src_line) = parse_loc(line, line_no)?;
            let loc = match files.get_by_id(index) {
                Some(path) => SourceLocation {
                    file: FileRef::Path(path.clone()),
                    line: src_line,
                },
                None => SourceLocation::indexed(index, src_line),
            };
            state = state.step(ScanEvent::Annotate(loc));
            continue;
        }

        let Some(location) = state.location() else {
            continue;
        };
        let Some(kernel) = current.as_deref().and_then(|k| listing.kernel_mut(k)) else {
            continue;
        };

        let tokens = tokenize_assembly(line);
        if is_label(line) || is_comment(line) {
            kernel.push_plain(tokens);
        } else {
            kernel.push_instruction(next_address, tokens, location);
            next_address += 1;
        }
        // Whatever follows the body (.func helpers, globals) belongs to no kernel.
        if braces.closes(line) {
            debug!("Kernel {:?} body ends at line {}", current, line_no);
            state = state.step(ScanEvent::EndBody);
        }
    }

    for kernel in listing.kernels.values() {
        if let Some(index) = kernel.raw_map.first_unresolved_index() {
            warn!("Kernel {} references file #{} with no .file entry", kernel.name, index);
            return Err(IndexError::unresolved(
                format!("#{}", index),
                format!("no .file entry for index used by kernel {}", kernel.name),
            ));
        }
    }

    debug!(
        "Intermediate listing parsed: {} kernels, {} files",
        listing.kernels.len(),
        files.len()
    );
    Ok(listing)
}
