//! Idle detection over captured terminal buffers.

use termlink_core::ExtractorPatterns;

use crate::ansi::strip_decoration;

/// Decide whether the wrapped agent CLI has finished producing output.
///
/// Scans the last `patterns.scan_lines` lines of the decoration-stripped
/// buffer. Any busy indicator (a spinner/tool line still animating) means not
/// idle; otherwise the buffer is idle only if an input prompt line is visible
/// in the scanned window.
pub fn is_idle(buffer: &str, patterns: &ExtractorPatterns) -> bool {
    let stripped = strip_decoration(buffer);
    let lines: Vec<&str> = stripped.lines().collect();
    let start = lines.len().saturating_sub(patterns.scan_lines);

    let mut saw_prompt = false;
    for line in &lines[start..] {
        if patterns.is_separator_line(line) {
            continue;
        }
        if is_busy_indicator(line, patterns) {
            return false;
        }
        if is_prompt_line(line, patterns) {
            saw_prompt = true;
        }
    }
    saw_prompt
}

/// A line the CLI prints while thinking or running a tool: starts with a busy
/// glyph, carries a trailing ellipsis, stays short, and is neither a shown
/// keybinding hint nor quoted input echo.
fn is_busy_indicator(line: &str, patterns: &ExtractorPatterns) -> bool {
    let trimmed = line.trim_start().trim_end();
    trimmed.contains(patterns.ellipsis.as_str())
        && trimmed.chars().count() <= patterns.max_busy_line_len
        && !patterns.is_hint_line(trimmed)
        && !trimmed.starts_with(patterns.quote_marker.as_str())
        && patterns.starts_with_busy_glyph(trimmed)
}

/// An empty input prompt: exactly the marker, or the marker followed by a
/// space or non-breaking space.
fn is_prompt_line(line: &str, patterns: &ExtractorPatterns) -> bool {
    let trimmed = line.trim();
    let marker = patterns.prompt_marker.as_str();
    trimmed == marker
        || (trimmed.starts_with(marker)
            && trimmed[marker.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == ' ' || c == '\u{a0}'))
}
