//! Architectural Enforcement
//!
//! Source-scanning checks that keep the async crates honest:
//! - No blocking file, network, or stdio calls in production code
//! - No `sleep()` standing in for waiting on I/O
//!
//! Production code is everything in a source file before its first
//! `#[cfg(test)]` line; `//` comments are ignored.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Source directories scanned, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["conductor/core/src", "conductor/cli/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// What rule was broken
    pub rule: &'static str,
    /// The trimmed line
    pub line: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line_number,
            self.rule,
            self.line
        )
    }
}

/// A forbidden pattern and the rule it belongs to
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Substring that must not appear in production code
    pub pattern: &'static str,
    /// Rule description
    pub name: &'static str,
}

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Code part of a line, with any `//` comment removed
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Lines that belong to production code
pub fn production_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .map(|(idx, line)| (idx + 1, line))
}

/// Check one file's content against `rules`
pub fn check_source(path: &Path, content: &str, rules: &[Rule]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (line_number, line) in production_lines(content) {
        let code = code_part(line);
        for rule in rules {
            if code.contains(rule.pattern) {
                violations.push(Violation {
                    path: path.to_path_buf(),
                    line_number,
                    rule: rule.name,
                    line: line.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Check every `.rs` file under the production directories
pub fn scan_workspace(rules: &[Rule]) -> Vec<Violation> {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir = root.join(dir);
        if !dir.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            violations.extend(check_source(path, &content, rules));
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: [Rule; 1] = [Rule {
        pattern: "std::fs::",
        name: "Blocking file I/O",
    }];

    #[test]
    fn test_code_after_cfg_test_is_ignored() {
        let source = "\
fn load() {
    let _ = std::fs::read(\"a\");
}

#[cfg(test)]
mod tests {
    fn helper() { let _ = std::fs::read(\"b\"); }
}
";
        let violations = check_source(Path::new("x.rs"), source, &RULES);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line_number, 2);
    }

    #[test]
    fn test_comments_are_ignored() {
        let source = "// std::fs::read is blocking\nlet x = 1; // std::fs::write too\n";
        assert!(check_source(Path::new("x.rs"), source, &RULES).is_empty());
    }

    #[test]
    fn test_workspace_root_contains_core() {
        assert!(workspace_root().join("conductor/core/Cargo.toml").exists());
    }
}
