//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods.
//! **Required**: Periodic work uses `tokio::time::interval`; one-off waits use
//! `sleep_until` with a deadline inside `select!`, so clear and shutdown can
//! interrupt them.
//!
//! Test code is exempt.

use std::path::Path;

use architectural_enforcement::{code_part, is_test_code, production_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();
    for path in production_sources() {
        check_file(&path, &mut violations);
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - tokio::time::interval() for ticks and drains");
        eprintln!("  - tokio::time::sleep_until(deadline) inside select!");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - std::thread::sleep anywhere");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        if is_sleep_call(line) && !is_test_code(&lines, idx) {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
        }
    }
}

fn is_sleep_call(line: &str) -> bool {
    let code = code_part(line);
    code.contains("::sleep(") || code.contains(".sleep(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
        assert!(is_sleep_call("    std::thread::sleep(delay);"));
        assert!(!is_sleep_call("    tokio::time::sleep_until(deadline).await;"));
        assert!(!is_sleep_call("    // tokio::time::sleep(d) would block clear"));
    }

    #[test]
    fn test_sleep_in_test_fn_is_allowed() {
        let code = [
            "#[tokio::test]",
            "async fn test_pacing() {",
            "    tokio::time::sleep(Duration::from_secs(1)).await;",
            "}",
        ];
        assert!(is_sleep_call(code[2]));
        assert!(is_test_code(&code, 2));
    }
}
