// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use path_absolutize::Absolutize;
use std::path::Path;

/// Resolves a path string to its absolute form, a leading `~`
/// is replaced by the home directory.
pub fn resolve_path(path: &str) -> String {
    if path.is_empty() {
        return "".to_string();
    }
    let mut p = path.to_string();
    if let Some(rest) = p.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            p = home.to_string_lossy().to_string() + rest;
        };
    }
    if let Ok(p) = Path::new(&p).absolutize() {
        p.to_string_lossy().to_string()
    } else {
        p
    }
}

/// Splits the comma separated list, items are trimmed and
/// empty items are dropped. The order is kept.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{resolve_path, split_list};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_path() {
        assert_eq!("", resolve_path(""));
        assert_eq!("/etc/ssl/key.pem", resolve_path("/etc/ssl/key.pem"));
        assert_eq!("/etc/key.pem", resolve_path("/etc/ssl/../key.pem"));
        let home = dirs::home_dir()
            .map(|home| home.to_string_lossy().to_string())
            .unwrap_or_default();
        if !home.is_empty() {
            assert_eq!(format!("{home}/certs"), resolve_path("~/certs"));
        }
        assert!(resolve_path("cert.pem").starts_with('/'));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            vec!["example.com".to_string(), "www.example.com".to_string()],
            split_list(" example.com, ,www.example.com ")
        );
        assert!(split_list(" , ").is_empty());
    }
}
