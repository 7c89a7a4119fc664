//! Code Review Gate
//!
//! Static review applied to any code string before it executes: python tool
//! inputs, predicate/assert verifier bodies, and substituted tool inputs.
//! This is the sole defense in the default configuration; there is no
//! runtime isolation behind it.

use std::sync::LazyLock;

use regex::Regex;

/// Module roots whose import is always rejected.
const DANGEROUS_IMPORTS: &[&str] = &[
    "os",
    "subprocess",
    "sys",
    "socket",
    "shutil",
    "ctypes",
    "multiprocessing",
];

/// Builtins whose call is always rejected.
const DANGEROUS_BUILTINS: &[&str] = &["eval", "exec", "compile", "__import__", "open"];

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|;)\s*import\s+([A-Za-z_][\w.]*(?:\s*,\s*[A-Za-z_][\w.]*)*)")
        .expect("static pattern")
});
static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|;)\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("static pattern")
});
static BUILTIN_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])(eval|exec|compile|__import__|open)\s*\(").expect("static pattern")
});
static DESTRUCTIVE_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)rm\s+-rf", "recursive delete"),
        (r"(?i)del\s+/", "recursive delete"),
        (r"(?i)format\s+[a-z]:", "drive format"),
        (r"\.\.[\\/]", "path traversal"),
        (r"(?i)\bregistry\b|winreg", "registry access"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("static pattern"), label))
    .collect()
});

/// Outcome of one review. `safe == issues.is_empty()`.
#[derive(Debug, Clone)]
pub struct ReviewReport {
    pub safe: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReviewReport {
    /// Single-line rationale suitable for a blocked ToolCall's stderr.
    pub fn rationale(&self) -> String {
        format!("Blocked by code review: {}", self.issues.join("; "))
    }
}

fn is_dangerous_module(name: &str) -> bool {
    let root = name.split('.').next().unwrap_or(name);
    DANGEROUS_IMPORTS.contains(&root) || root.starts_with("win32")
}

/// Review a code string. Pure: same input, same report.
pub fn review(code: &str) -> ReviewReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    for capture in IMPORT_RE.captures_iter(code) {
        for name in capture[1].split(',') {
            let name = name.trim();
            if is_dangerous_module(name) {
                issues.push(format!("dangerous import: {name}"));
            }
        }
    }
    for capture in FROM_IMPORT_RE.captures_iter(code) {
        let name = capture[1].trim();
        if is_dangerous_module(name) {
            issues.push(format!("dangerous import from: {name}"));
        }
    }
    for capture in BUILTIN_CALL_RE.captures_iter(code) {
        issues.push(format!("dangerous builtin: {}", &capture[1]));
    }
    for (pattern, label) in DESTRUCTIVE_RES.iter() {
        if pattern.is_match(code) {
            issues.push(format!("destructive pattern: {label}"));
        }
    }

    if code.contains("while True") {
        warnings.push("unbounded loop".to_string());
    }

    ReviewReport {
        safe: issues.is_empty(),
        issues,
        warnings,
    }
}
