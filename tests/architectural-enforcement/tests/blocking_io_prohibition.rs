//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code in the core and the CLI MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::io`, and async `reqwest`, not `std::fs`,
//! `std::net`, or `reqwest::blocking`. Terminal output goes through the
//! printer task, never `println!`/`eprintln!`.

use architectural_enforcement::{scan_workspace, Rule};

const BLOCKING_IO: [Rule; 9] = [
    Rule {
        pattern: "std::fs::",
        name: "Blocking file I/O",
    },
    Rule {
        pattern: "use std::fs",
        name: "Blocking file I/O",
    },
    Rule {
        pattern: "std::net::",
        name: "Blocking network I/O",
    },
    Rule {
        pattern: "use std::net",
        name: "Blocking network I/O",
    },
    Rule {
        pattern: "reqwest::blocking",
        name: "Blocking HTTP client",
    },
    Rule {
        pattern: "std::io::stdin()",
        name: "Blocking stdin",
    },
    Rule {
        pattern: "std::io::stdout()",
        name: "Blocking stdout",
    },
    Rule {
        pattern: "println!(",
        name: "Blocking stdout",
    },
    Rule {
        pattern: "eprintln!(",
        name: "Blocking stderr",
    },
];

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan_workspace(&BLOCKING_IO);

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::io::stdin/stdout, and async reqwest instead.");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}
