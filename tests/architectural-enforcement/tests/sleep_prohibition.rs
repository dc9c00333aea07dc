//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Periodic work uses
//! `tokio::time::interval`; waiting on the backend uses the response futures.
//! Test code (after `#[cfg(test)]`) is exempt.

use architectural_enforcement::find_violations;

#[test]
fn test_no_sleep_in_production_code() {
    let violations =
        find_violations(|_, code| code.contains("::sleep(") || code.contains(".sleep("));

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::time::interval() for periodic tasks.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
