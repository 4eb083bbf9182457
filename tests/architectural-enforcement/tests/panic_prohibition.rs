//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code MUST NOT call `unwrap()` or `expect()`.
//! Data problems are skipped with a warning, denials are values, and
//! invariant violations are returned as errors.

use architectural_enforcement::{report, scan_production};

fn is_panicking_call(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan_production(is_panicking_call);
    report("unwrap()/expect() found in production code!", &violations);
}

#[test]
fn test_fallible_helpers_are_allowed() {
    assert!(!is_panicking_call("value.unwrap_or(0)"));
    assert!(!is_panicking_call("value.unwrap_or_else(Default::default)"));
    assert!(is_panicking_call("value.unwrap()"));
    assert!(is_panicking_call(r#"value.expect("present")"#));
}
