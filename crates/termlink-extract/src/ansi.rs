//! ANSI decoration stripping.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Everything a capture may carry that is not printable content:
    /// OSC sequences (titles), CSI sequences (cursor movement, colors,
    /// device-attribute responses), remaining two-byte escapes, and stray
    /// C0 control bytes other than newline and tab.
    static ref DECORATION_RE: Regex = Regex::new(concat!(
        r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?",
        r"|\x1b\[[0-9;?:<=>]*[ -/]*[@-~]",
        r"|\x1b[@-Z\\^_]",
        r"|[\x00-\x08\x0b-\x1f\x7f]",
    ))
    .expect("decoration regex is valid");
}

/// Remove all terminal decoration from `text`, leaving printable content,
/// newlines and tabs only.
///
/// Idempotent: stripping already-stripped text is a no-op.
pub fn strip_decoration(text: &str) -> String {
    DECORATION_RE.replace_all(text, "").into_owned()
}
