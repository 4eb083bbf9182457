//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. The narrator
//! expresses every wait as a deadline; only the runtime driver suspends, and
//! it does so with `sleep_until` on the next deadline.

use architectural_enforcement::{report, scan_production};

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(is_sleep_call);
    report("Sleep calls found in production code!", &violations);
}

#[test]
fn test_sleep_until_is_allowed() {
    assert!(!is_sleep_call("sleep_until(Instant::from_std(deadline)).await"));
    assert!(is_sleep_call("std::thread::sleep(Duration::from_millis(5));"));
    assert!(is_sleep_call("tokio::time::sleep(delay).await;"));
}
