//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the barrage crates MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::io`, `tokio::process` inside `async fn`.
//!
//! Synchronous functions may block. The config store and the settings loader
//! read small files from plain `fn`s, which is fine as long as no async code
//! path reaches `std::fs` directly.

use std::path::Path;

use architectural_enforcement::{code_part, enclosing_fn, is_test_code, production_sources, FnKind};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let mut violations = Vec::new();
    for path in production_sources() {
        check_file(&path, &mut violations);
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        eprintln!("  - `use std::fs` / `use std::net` imports");
        eprintln!("  - std::fs::*, std::net::* inside async fn");
        eprintln!("  - std::process::Command");
        eprintln!("  - std::io::stdin(), std::io::stdout() inside async fn");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs, tokio::io::stdin(), tokio::process::Command");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Fully qualified std::fs calls in non-async functions");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
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
        if is_test_code(&lines, idx) {
            continue;
        }
        if let Some(reason) = blocking_io_reason(&lines, idx) {
            violations.push(format!(
                "{}:{} - {reason}: {}",
                path.display(),
                idx + 1,
                line.trim()
            ));
        }
    }
}

/// Why line `idx` is a violation, if it is one
fn blocking_io_reason(lines: &[&str], idx: usize) -> Option<&'static str> {
    let code = code_part(lines[idx]);
    let in_async = matches!(enclosing_fn(lines, idx), Some((_, FnKind::Async)));

    // Imports hide the blocking call sites from the checks below
    if code.contains("use std::fs") || code.contains("use std::net") {
        return Some("Blocking I/O import");
    }
    if code.contains("std::process::Command") {
        return Some("Blocking process I/O");
    }
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if in_async && code.contains("std::fs::") {
        return Some("Blocking file I/O in async");
    }
    if in_async && code.contains("std::net::") {
        return Some("Blocking network I/O in async");
    }
    if in_async && (code.contains("std::io::stdin()") || code.contains("std::io::stdout()")) {
        return Some("Blocking stdin/stdout in async");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_file_read_is_flagged() {
        let code = [
            "pub async fn load() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];
        assert_eq!(
            blocking_io_reason(&code, 1),
            Some("Blocking file I/O in async")
        );
    }

    #[test]
    fn test_sync_file_read_is_allowed() {
        let code = [
            "pub fn load_settings_from_path(path: &Path) {",
            "    let contents = std::fs::read_to_string(path)?;",
            "}",
        ];
        assert_eq!(blocking_io_reason(&code, 1), None);
    }

    #[test]
    fn test_imports_are_flagged() {
        let code = ["use std::fs;"];
        assert_eq!(blocking_io_reason(&code, 0), Some("Blocking I/O import"));

        let code = ["use tokio::fs;"];
        assert_eq!(blocking_io_reason(&code, 0), None);
    }

    #[test]
    fn test_tokio_process_is_allowed() {
        let code = [
            "async fn speak(&self) {",
            "    let mut child = tokio::process::Command::new(&self.program);",
            "}",
        ];
        assert_eq!(blocking_io_reason(&code, 1), None);
    }
}
