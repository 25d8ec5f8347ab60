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
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::utils::{format_machine_address, normalize_machine_address, parse_hex_address};

/// Address of a line in one of the two assembly listings.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum BinaryAddress {
    Machine(String),
    Intermediate(u32),
}

impl BinaryAddress {
    pub fn machine(address: &str) -> Option<Self> {
        normalize_machine_address(address).map(BinaryAddress::Machine)
    }

    /// Machine address from a report field: a hex string or a plain byte offset.
    pub fn machine_from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => BinaryAddress::machine(s),
            Value::Number(n) => n
                .as_u64()
                .map(|n| BinaryAddress::Machine(format_machine_address(n))),
            _ => None,
        }
    }

    /// Intermediate statement number from a report field: an integer or a decimal string.
    pub fn intermediate_from_json(value: &Value) -> Option<Self> {
        let n = match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        n.filter(|n| *n > 0).map(BinaryAddress::Intermediate)
    }

    /// Decode `value` as an address in the same listing as `self`.
    pub fn sibling_from_json(&self, value: &Value) -> Option<Self> {
        match self {
            BinaryAddress::Machine(_) => BinaryAddress::machine_from_json(value),
            BinaryAddress::Intermediate(_) => BinaryAddress::intermediate_from_json(value),
        }
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.starts_with("0x") || text.starts_with("0X") {
            BinaryAddress::machine(text)
        } else {
            text.parse().ok().map(BinaryAddress::Intermediate)
        }
    }

    fn ordinal(&self) -> Option<u64> {
        match self {
            BinaryAddress::Machine(s) => parse_hex_address(s),
            BinaryAddress::Intermediate(n) => Some(u64::from(*n)),
        }
    }

    pub fn same_listing(&self, other: &BinaryAddress) -> bool {
        matches!(
            (self, other),
            (BinaryAddress::Machine(_), BinaryAddress::Machine(_))
                | (BinaryAddress::Intermediate(_), BinaryAddress::Intermediate(_))
        )
    }
}

impl fmt::Display for BinaryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryAddress::Machine(s) => write!(f, "{}", s),
            BinaryAddress::Intermediate(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ts_rs::TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

/// Which displayed lines a token highlight applies to.
///
/// Serialized as the key of a [`HighlightMap`]: `0x50` (that line only), `<=0x50` / `>=0x50`
/// (every displayed line at or before / at or after it) or `*` (every displayed line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSelector {
    Exact(BinaryAddress),
    AtOrBefore(BinaryAddress),
    AtOrAfter(BinaryAddress),
    All,
}

impl LineSelector {
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if key == "*" {
            return Some(LineSelector::All);
        }
        if let Some(rest) = key.strip_prefix("<=") {
            return BinaryAddress::parse(rest).map(LineSelector::AtOrBefore);
        }
        if let Some(rest) = key.strip_prefix(">=") {
            return BinaryAddress::parse(rest).map(LineSelector::AtOrAfter);
        }
        BinaryAddress::parse(key).map(LineSelector::Exact)
    }

    pub fn key(&self) -> String {
        match self {
            LineSelector::Exact(a) => a.to_string(),
            LineSelector::AtOrBefore(a) => format!("<={}", a),
            LineSelector::AtOrAfter(a) => format!(">={}", a),
            LineSelector::All => "*".to_string(),
        }
    }

    /// Address-less lines (labels, directives) are only covered by the wildcard.
    pub fn matches(&self, address: Option<&BinaryAddress>) -> bool {
        let Some(address) = address else {
            return *self == LineSelector::All;
        };
        let compare = |bound: &BinaryAddress| -> Option<std::cmp::Ordering> {
            if !bound.same_listing(address) {
                return None;
            }
            Some(address.ordinal()?.cmp(&bound.ordinal()?))
        };
        match self {
            LineSelector::All => true,
            LineSelector::Exact(bound) => bound == address,
            LineSelector::AtOrBefore(bound) => compare(bound).is_some_and(|o| o.is_le()),
            LineSelector::AtOrAfter(bound) => compare(bound).is_some_and(|o| o.is_ge()),
        }
    }

    /// Indices of the currently displayed lines this selector covers.
    pub fn select(&self, displayed: &[Option<BinaryAddress>]) -> Vec<usize> {
        displayed
            .iter()
            .enumerate()
            .filter(|(_, address)| self.matches(address.as_ref()))
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for LineSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Selector key → literal token text → color.
pub type HighlightMap = BTreeMap<String, BTreeMap<String, Color>>;

pub fn add_highlight(map: &mut HighlightMap, selector: LineSelector, token: &str, color: Color) {
    if token.is_empty() {
        return;
    }
    map.entry(selector.key())
        .or_default()
        .insert(token.to_string(), color);
}

/// Evaluate every selector of `map` against the displayed lines and merge the token colors per
/// line index. Unparseable selector keys are ignored.
pub fn resolve_highlights(
    map: &HighlightMap,
    displayed: &[Option<BinaryAddress>],
) -> BTreeMap<usize, BTreeMap<String, Color>> {
    let mut result: BTreeMap<usize, BTreeMap<String, Color>> = BTreeMap::new();
    for (key, tokens) in map {
        let Some(selector) = LineSelector::parse(key) else {
            continue;
        };
        for index in selector.select(displayed) {
            result
                .entry(index)
                .or_default()
                .extend(tokens.iter().map(|(t, c)| (t.clone(), *c)));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn m(s: &str) -> Option<BinaryAddress> {
        BinaryAddress::machine(s)
    }

    #[test]
    fn selector_keys_parse_back() {
        for key in ["0x50", "<=0x50", ">=0x1a0", "*", "12", "<=3"] {
            assert_eq!(LineSelector::parse(key).unwrap().key(), key);
        }
        assert_eq!(
            LineSelector::parse("<=0x0050"),
            Some(LineSelector::AtOrBefore(BinaryAddress::Machine("0x50".into())))
        );
        assert_eq!(LineSelector::parse("<=nope"), None);
    }

    #[test]
    fn selectors_evaluate_against_displayed_lines() {
        let displayed = vec![None, m("0x10"), m("0x50"), None, m("0x60")];
        let before = LineSelector::parse("<=0x50").unwrap();
        assert_eq!(before.select(&displayed), vec![1, 2]);
        let after = LineSelector::parse(">=0x50").unwrap();
        assert_eq!(after.select(&displayed), vec![2, 4]);
        let exact = LineSelector::parse("0x60").unwrap();
        assert_eq!(exact.select(&displayed), vec![4]);
        assert_eq!(LineSelector::All.select(&displayed), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn selectors_do_not_cross_listings() {
        let displayed = vec![Some(BinaryAddress::Intermediate(3)), m("0x3")];
        let sel = LineSelector::parse("<=5").unwrap();
        assert_eq!(sel.select(&displayed), vec![0]);
    }

    #[test]
    fn field_decides_the_listing() {
        assert_eq!(BinaryAddress::machine_from_json(&json!("0050")), m("0x50"));
        assert_eq!(BinaryAddress::machine_from_json(&json!(80)), m("0x50"));
        assert_eq!(BinaryAddress::machine_from_json(&json!(-1)), None);
        assert_eq!(BinaryAddress::machine_from_json(&json!(null)), None);

        assert_eq!(
            BinaryAddress::intermediate_from_json(&json!(7)),
            Some(BinaryAddress::Intermediate(7))
        );
        assert_eq!(
            BinaryAddress::intermediate_from_json(&json!("12")),
            Some(BinaryAddress::Intermediate(12))
        );
        assert_eq!(BinaryAddress::intermediate_from_json(&json!("0x12")), None);
        assert_eq!(BinaryAddress::intermediate_from_json(&json!(0)), None);

        let own = BinaryAddress::Intermediate(3);
        assert_eq!(
            own.sibling_from_json(&json!("5")),
            Some(BinaryAddress::Intermediate(5))
        );
        assert_eq!(m("0x10").unwrap().sibling_from_json(&json!(16)), m("0x10"));
    }

    #[test]
    fn resolve_merges_tokens_per_line() {
        let mut map = HighlightMap::new();
        add_highlight(&mut map, LineSelector::parse("<=0x10").unwrap(), "R4", Color::Red);
        add_highlight(&mut map, LineSelector::All, "P0", Color::Purple);
        add_highlight(&mut map, LineSelector::All, "", Color::Blue);
        let displayed = vec![m("0x0"), m("0x10"), m("0x20")];
        let resolved = resolve_highlights(&map, &displayed);
        assert_eq!(resolved[&0].len(), 2);
        assert_eq!(resolved[&1].get("R4"), Some(&Color::Red));
        assert_eq!(resolved[&2].len(), 1);
        assert_eq!(resolved[&2].get("P0"), Some(&Color::Purple));
    }
}
