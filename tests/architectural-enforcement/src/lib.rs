//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code, timers use deadlines and intervals
//! - No blocking I/O inside async functions
//!
//! The library holds the line-based source scanner the tests share.

use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["barrage/core/src", "barrage/daemon/src"];

/// Absolute path of the workspace root
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under the production roots
#[must_use]
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files
}

/// A line with its trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Flavor of a function signature line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// Plain `fn`
    Sync,
}

/// Classify `line` if it opens a function
///
/// Visibility and `const`/`unsafe` qualifiers are skipped, so
/// `pub(crate) async fn run()` is [`FnKind::Async`].
#[must_use]
pub fn fn_signature(line: &str) -> Option<FnKind> {
    let mut is_async = false;

    for word in line.split_whitespace() {
        match word {
            "pub" | "const" | "unsafe" | "default" => {}
            "async" => is_async = true,
            "fn" => {
                return Some(if is_async { FnKind::Async } else { FnKind::Sync });
            }
            w if w.starts_with("pub(") => {}
            _ => return None,
        }
    }

    None
}

/// The nearest function signature above `current_idx`, if any
///
/// Scanning stops at `mod` and `impl` boundaries.
#[must_use]
pub fn enclosing_fn(lines: &[&str], current_idx: usize) -> Option<(usize, FnKind)> {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if let Some(kind) = fn_signature(line) {
            return Some((i, kind));
        }

        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return None;
        }
    }
    None
}

/// Index of the first `#[cfg(test)]` line; everything from there on is test code
#[must_use]
pub fn test_region_start(lines: &[&str]) -> usize {
    lines
        .iter()
        .position(|l| l.trim() == "#[cfg(test)]")
        .unwrap_or(lines.len())
}

/// Whether `current_idx` belongs to a test module or a test function
#[must_use]
pub fn is_test_code(lines: &[&str], current_idx: usize) -> bool {
    if current_idx >= test_region_start(lines) {
        return true;
    }

    let Some((fn_idx, _)) = enclosing_fn(lines, current_idx) else {
        return false;
    };

    // Attributes sit directly above the signature
    for i in (0..fn_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature() {
        assert_eq!(fn_signature("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_signature("pub fn load(&self) -> Option<T> {"), Some(FnKind::Sync));
        assert_eq!(
            fn_signature("pub(crate) async fn run(mut self) {"),
            Some(FnKind::Async)
        );
        assert_eq!(fn_signature("async fn handle_line(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_signature("let f = fn_ptr;"), None);
        assert_eq!(fn_signature("// fn commented()"), None);
    }

    #[test]
    fn test_enclosing_fn_stops_at_impl() {
        let code = [
            "fn outer() {}",
            "impl Foo {",
            "    const X: u8 = 1;",
        ];
        assert_eq!(enclosing_fn(&code, 2), None);

        let code = [
            "impl Foo {",
            "    pub async fn go(&self) {",
            "        std::fs::read(\"x\");",
            "    }",
        ];
        assert_eq!(enclosing_fn(&code, 2), Some((1, FnKind::Async)));
    }

    #[test]
    fn test_test_code_detection() {
        let code = [
            "fn helper() {}",
            "",
            "#[tokio::test(start_paused = true)]",
            "async fn test_ticks() {",
            "    tick();",
            "}",
        ];
        assert!(!is_test_code(&code, 0));
        assert!(is_test_code(&code, 4));

        let code = ["fn prod() {}", "#[cfg(test)]", "mod tests {", "    fn helper() {}"];
        assert!(!is_test_code(&code, 0));
        assert!(is_test_code(&code, 3));
    }

    #[test]
    fn test_production_sources_found() {
        let sources = production_sources();
        assert!(sources.iter().any(|p| p.ends_with("engine.rs")));
        assert!(sources.iter().any(|p| p.ends_with("main.rs")));
    }
}
