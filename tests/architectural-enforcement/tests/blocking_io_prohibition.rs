//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Network I/O in production code goes through async clients.
//! `reqwest::blocking` and `std::net` sockets would stall the runtime threads
//! that also drive polling and streaming.

use architectural_enforcement::find_violations;

const FORBIDDEN: &[&str] = &["reqwest::blocking", "std::net::TcpStream", "std::net::TcpListener"];

#[test]
fn test_no_blocking_network_io_in_production_code() {
    let violations = find_violations(|_, code| FORBIDDEN.iter().any(|f| code.contains(f)));

    if !violations.is_empty() {
        eprintln!("\nBlocking network I/O found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse reqwest's async client or tokio::net instead.");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}
