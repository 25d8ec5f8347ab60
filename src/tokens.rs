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

//! Line tokenizers shared by the parsers and the source aggregator.
//!
//! Assembly tokens drop their delimiters (the renderer re-spaces them), source tokens keep every
//! delimiter and whitespace run so a line can be rebuilt exactly.

use regex::Regex;
use std::sync::OnceLock;

fn assembly_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,;(){}\[\]`]+").expect("static regex"))
}

fn source_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|\s+|[^\w\s]").expect("static regex"))
}

/// Split an assembly line on whitespace and punctuation, dropping empties.
pub fn tokenize_assembly(line: &str) -> Vec<String> {
    assembly_splitter()
        .split(line)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a source line into identifiers/numbers, whitespace runs and single punctuation
/// characters. Concatenating the result yields the input.
pub fn tokenize_source(line: &str) -> Vec<String> {
    source_splitter()
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_tokens_drop_delimiters() {
        assert_eq!(
            tokenize_assembly("  MOV R1, c[0x0][0x28] ;"),
            vec!["MOV", "R1", "c", "0x0", "0x28"]
        );
        assert_eq!(tokenize_assembly("BRA `(.L_x_1);"), vec!["BRA", ".L_x_1"]);
        assert_eq!(
            tokenize_assembly("\tld.param.u64 \t%rd1, [_Z3addPi_param_0];"),
            vec!["ld.param.u64", "%rd1", "_Z3addPi_param_0"]
        );
        assert!(tokenize_assembly("   ").is_empty());
    }

    #[test]
    fn source_tokens_round_trip() {
        let line = "    out[i] = a[i] + b[i]; // sum";
        let tokens = tokenize_source(line);
        assert_eq!(tokens.concat(), line);
        assert_eq!(&tokens[0..4], &["    ", "out", "[", "i"]);
        assert!(tokens.contains(&"//".chars().next().unwrap().to_string()));
    }
}
