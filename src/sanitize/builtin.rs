//! The default sanitizers.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{SanitizeContext, Sanitizer};

pub const ROOT_DIR_PLACEHOLDER: &str = "<rootDir>";
pub const CWD_PLACEHOLDER: &str = "<cwd>";

/// A run of consecutive `at ...` frame lines, each optionally colored.
static STACK_TRACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\n(?:\x1b\[\d+m)?\s*at\s+[^\n]+)+").expect("valid regex")
});

static FRAME_INDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\n(?:\x1b\[\d+m)?(\s*)at\s").expect("valid regex"));

static THROW_LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.js):\d+(\s+throw)").expect("valid regex"));

/// Default pipeline, in application order.
pub fn defaults() -> Vec<Sanitizer> {
    vec![
        Sanitizer::from_fn("strip_ansi", strip_ansi),
        Sanitizer::new("replace_root_dir", replace_root_dir),
        Sanitizer::new("replace_cwd", replace_cwd),
        Sanitizer::from_fn("collapse_stack_trace", collapse_stack_trace),
        Sanitizer::from_fn("omit_throw_line_number", omit_throw_line_number),
    ]
}

/// Remove terminal escape sequences (colors, cursor movement, OSC titles).
pub fn strip_ansi(s: &str) -> String {
    String::from_utf8_lossy(&strip_ansi_escapes::strip(s)).into_owned()
}

pub fn replace_root_dir(s: &str, ctx: &SanitizeContext) -> String {
    replace_path(s, &ctx.root_dir(), ROOT_DIR_PLACEHOLDER)
}

pub fn replace_cwd(s: &str, ctx: &SanitizeContext) -> String {
    replace_path(s, ctx.cwd(), CWD_PLACEHOLDER)
}

/// Replace every occurrence of `path` with `placeholder`.
///
/// Relative paths and the filesystem root are left alone: rewriting `/` or
/// `.` would mangle unrelated text.
pub fn replace_path(s: &str, path: &Path, placeholder: &str) -> String {
    if !path.is_absolute() || path.parent().is_none() {
        return s.to_string();
    }
    let needle = path.to_string_lossy();
    s.replace(needle.as_ref(), placeholder)
}

/// Collapse each run of stack frame lines into a single `at somewhere` line
/// indented like the first frame of the run.
pub fn collapse_stack_trace(s: &str) -> String {
    STACK_TRACE_RUN
        .replace_all(s, |caps: &Captures<'_>| {
            let indent = FRAME_INDENT
                .captures(&caps[0])
                .and_then(|frame| frame.get(1))
                .map_or("", |m| m.as_str());
            format!("\n{indent}at somewhere")
        })
        .into_owned()
}

/// `foo.js:57\n    throw` becomes `foo.js\n    throw`.
pub fn omit_throw_line_number(s: &str) -> String {
    THROW_LINE_NUMBER.replace_all(s, "${1}${2}").into_owned()
}
