//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code (the narrator waits on deadlines)
//! - No unwrap()/expect() in production code (errors propagate)
//! - Separation of concerns (the core has no terminal UI dependencies)
//!
//! These tests are designed to catch violations early in the development cycle.
//! This library holds the shared source scanner; the checks live in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["conductor/core/src", "conductor/daemon/src"];

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// One offending line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The trimmed line
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Lines of production code in `content`
///
/// Scanning stops at the first `#[cfg(test)]`, and comment lines (doc
/// examples included) are skipped. Trailing `//` comments are cut off.
pub fn production_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
}

/// Scan every production directory for lines matching `is_violation`
pub fn scan_production<F>(is_violation: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir = root.join(dir);
        assert!(dir.exists(), "missing production directory {}", dir.display());

        for path in rust_files(&dir) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for (line, code) in production_lines(&content) {
                if is_violation(code) {
                    violations.push(Violation {
                        path: path.clone(),
                        line,
                        text: code.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Print violations and fail
///
/// # Panics
///
/// Panics when `violations` is non-empty.
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// x.unwrap()\nlet y = 1; // trailing\n#[cfg(test)]\nfn t() {}\n";
        let lines: Vec<_> = production_lines(source).collect();
        assert_eq!(lines, vec![(1, "fn a() {}"), (3, "let y = 1; ")]);
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }
}
