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

use urlencoding::decode;

/// Normalize a file path as it appears in a debug annotation so that the same file spelled
/// by the machine listing, the intermediate listing and the report compares equal.
///
/// Unlike a filesystem canonicalization this never touches the disk: the paths refer to the
/// machine the kernel was compiled on, not necessarily this one.
pub fn normalize_source_path(source_path: &str) -> String {
    let mut path_str = source_path.trim().to_string();

    // 1. Handle file:// URIs
    if let Some(rest) = path_str.strip_prefix("file://") {
        let decoded = decode(rest).map(|s| s.into_owned()).unwrap_or_else(|_| rest.to_string());
        path_str = decoded;

        // file:///C:/... becomes /C:/... so we need to strip the leading /
        if path_str.starts_with('/') && path_str.chars().nth(2) == Some(':') {
            path_str.remove(0);
        }
    }

    // 2. Force forward slashes
    let mut final_path = path_str.replace('\\', "/");

    // Windows Drive Letter Normalization (C:/ not c:/)
    if final_path.chars().nth(1) == Some(':') {
        let mut chars = final_path.chars();
        if let Some(drive) = chars.next() {
            final_path = format!("{}{}", drive.to_ascii_uppercase(), chars.as_str());
        }
    }

    final_path
}

/// Parse hex address from string (supports "0x1234" or "1234" format)
pub fn parse_hex_address(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let hex_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_str.is_empty() {
        return None;
    }
    u64::from_str_radix(hex_str, 16).ok()
}

/// Canonical spelling of a machine address: lowercase, `0x` prefixed, no leading zeros.
pub fn format_machine_address(address: u64) -> String {
    format!("0x{:x}", address)
}

/// Normalize a textual machine address (`/*0050*/` contents, `0x0050`, `50`) to `0x50`.
pub fn normalize_machine_address(input: &str) -> Option<String> {
    parse_hex_address(input).map(format_machine_address)
}

/// Human readable kernel name. Kernel symbols are usually Itanium-mangled C++ names;
/// anything that does not demangle is returned as-is.
pub fn demangle_kernel_name(name: &str) -> String {
    match cpp_demangle::Symbol::new(name) {
        Ok(sym) => sym.demangle().unwrap_or_else(|_| name.to_string()),
        Err(_) => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_uri_and_separators() {
        assert_eq!(
            normalize_source_path("file:///home/me/my%20kernels/a.cu"),
            "/home/me/my kernels/a.cu"
        );
        assert_eq!(normalize_source_path("c:\\work\\a.cu"), "C:/work/a.cu");
        assert_eq!(normalize_source_path("  src/a.cu "), "src/a.cu");
    }

    #[test]
    fn machine_addresses_are_canonical() {
        assert_eq!(normalize_machine_address("0050").as_deref(), Some("0x50"));
        assert_eq!(normalize_machine_address("0x0050").as_deref(), Some("0x50"));
        assert_eq!(normalize_machine_address("0X1A0").as_deref(), Some("0x1a0"));
        assert_eq!(normalize_machine_address("0x"), None);
        assert_eq!(normalize_machine_address("zz"), None);
    }

    #[test]
    fn demangles_cpp_kernels() {
        assert_eq!(demangle_kernel_name("_Z3addPiS_S_"), "add(int*, int*, int*)");
        assert_eq!(demangle_kernel_name("plain_kernel"), "plain_kernel");
    }
}
