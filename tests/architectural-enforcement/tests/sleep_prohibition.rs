//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Turns wait on the
//! stream, deadlines use `tokio::time::timeout_at`, and the surface loop
//! waits in `select!` on input and controller updates.

use architectural_enforcement::{scan_workspace, Rule};

const SLEEP: [Rule; 2] = [
    Rule {
        pattern: "::sleep(",
        name: "Sleep call",
    },
    Rule {
        pattern: ".sleep(",
        name: "Sleep call",
    },
];

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_workspace(&SLEEP);

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on I/O, a channel, or a deadline instead of sleeping.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
