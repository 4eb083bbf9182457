//! Integration Test: UI Separation
//!
//! **Policy**: The narrator core is surface-agnostic. Terminal crates belong
//! to the daemon only.

use std::fs;

use architectural_enforcement::workspace_root;

const UI_CRATES: [&str; 3] = ["crossterm", "ratatui", "termion"];

#[test]
fn test_core_has_no_ui_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/core/Cargo.toml"))
        .expect("core manifest is readable");

    let offenders: Vec<_> = manifest
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            UI_CRATES
                .iter()
                .find(|krate| line.trim_start().starts_with(&format!("{krate} ")))
        })
        .collect();
    assert!(
        offenders.is_empty(),
        "narrator-core depends on UI crates: {offenders:?}"
    );
}

#[test]
fn test_daemon_owns_terminal_rendering() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/daemon/Cargo.toml"))
        .expect("daemon manifest is readable");
    assert!(manifest.contains("crossterm"));
}
