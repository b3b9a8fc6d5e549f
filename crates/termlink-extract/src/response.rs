//! Incremental response extraction: diff two buffer snapshots into the new
//! response text.

use std::collections::HashSet;

use termlink_core::ExtractorPatterns;

use crate::ansi::strip_decoration;

/// Extract the agent's new response text given a baseline buffer captured
/// before the prompt was sent and the current buffer.
///
/// Three anchoring strategies are tried in order, first success wins:
///
/// 1. **Prompt-echo anchor**: find the echoed prompt line in `after` and take
///    everything past it (and past its wrapped continuation lines).
/// 2. **Trailing-context anchor**: locate the last few content lines of
///    `before` inside `after` and take everything following them.
/// 3. **Set-difference fallback**: every line of `after` that never appeared
///    in `before`.
///
/// The result is post-filtered regardless of tier: separator and hint lines,
/// stray prompt markers and still-animating spinner lines are dropped, and
/// runs of blank lines are collapsed.
pub fn extract_response(
    before: &str,
    after: &str,
    sent_prompt: &str,
    patterns: &ExtractorPatterns,
) -> String {
    let before_stripped = strip_decoration(before);
    let after_stripped = strip_decoration(after);
    let flattened = sent_prompt.replace(['\r', '\n'], " ");
    let after_lines: Vec<&str> = after_stripped.lines().collect();

    let raw = tier_prompt_echo(&after_lines, &flattened, patterns)
        .or_else(|| tier_trailing_context(&before_stripped, &after_stripped, patterns))
        .unwrap_or_else(|| tier_set_difference(&before_stripped, &after_lines));

    post_process(&raw, patterns)
}

/// Pull tool names out of completed tool-call lines in extracted text.
pub fn tool_names(text: &str, patterns: &ExtractorPatterns) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in strip_decoration(text).lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix(patterns.tool_marker.as_str()) else {
            continue;
        };
        let Some(paren) = rest.find('(') else { continue };
        let name = rest[..paren].trim();
        if !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// Tier 1: anchor on the echoed prompt line in `after`.
fn tier_prompt_echo<'a>(
    after_lines: &[&'a str],
    flattened_prompt: &str,
    patterns: &ExtractorPatterns,
) -> Option<Vec<String>> {
    let prefix: String = flattened_prompt
        .trim()
        .chars()
        .take(patterns.prompt_prefix_len)
        .collect();
    if prefix.is_empty() {
        return None;
    }

    // The rolling remote buffer can hold several renders of the same echo;
    // the newest one precedes the most complete response.
    let anchor = after_lines.iter().rposition(|line| {
        line.trim_start().starts_with(patterns.prompt_marker.as_str()) && line.contains(&prefix)
    })?;

    let mut idx = anchor + 1;
    while idx < after_lines.len() && is_wrapped_continuation(after_lines[idx], patterns) {
        idx += 1;
    }
    Some(after_lines[idx..].iter().map(|s| s.to_string()).collect())
}

/// Tier 2: anchor on the last few content lines preceding the last prompt
/// line of `before`.
fn tier_trailing_context(
    before: &str,
    after: &str,
    patterns: &ExtractorPatterns,
) -> Option<Vec<String>> {
    let before_lines: Vec<&str> = before.lines().collect();
    let last_prompt = before_lines
        .iter()
        .rposition(|line| line.trim_start().starts_with(patterns.prompt_marker.as_str()))?;

    let mut context: Vec<&str> = Vec::new();
    for line in before_lines[..last_prompt].iter().rev() {
        if line.trim().is_empty() || patterns.is_separator_line(line) {
            continue;
        }
        context.push(line);
        if context.len() == patterns.context_lines {
            break;
        }
    }
    // A one- or two-line block is too weak an anchor
    if context.len() < 3 {
        return None;
    }
    context.reverse();
    let block = context.join("\n");

    let pos = after.rfind(&block)?;
    let rest = &after[pos + block.len()..];
    let rest_lines: Vec<&str> = rest.lines().collect();

    let mut idx = 0;
    while idx < rest_lines.len() && rest_lines[idx].trim().is_empty() {
        idx += 1;
    }
    // Skip the prompt echo the same way tier 1 does
    if idx < rest_lines.len()
        && rest_lines[idx]
            .trim_start()
            .starts_with(patterns.prompt_marker.as_str())
    {
        idx += 1;
        while idx < rest_lines.len() && is_wrapped_continuation(rest_lines[idx], patterns) {
            idx += 1;
        }
    }
    Some(rest_lines[idx..].iter().map(|s| s.to_string()).collect())
}

/// Tier 3: every line present in `after` but absent from `before`.
fn tier_set_difference(before: &str, after_lines: &[&str]) -> Vec<String> {
    let known: HashSet<&str> = before.lines().collect();
    after_lines
        .iter()
        .filter(|line| !known.contains(**line))
        .map(|s| s.to_string())
        .collect()
}

/// A wrapped continuation of an echoed prompt: indented, and not a completed
/// tool-call line.
fn is_wrapped_continuation(line: &str, patterns: &ExtractorPatterns) -> bool {
    line.starts_with([' ', '\t'])
        && !line.trim_start().starts_with(patterns.tool_marker.as_str())
        && !line.trim().is_empty()
}

/// Drop noise lines and collapse blank runs, regardless of extraction tier.
fn post_process(lines: &[String], patterns: &ExtractorPatterns) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blanks = 0usize;

    for line in lines {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks <= 2 {
                out.push(String::new());
            }
            continue;
        }
        blanks = 0;
        if patterns.is_separator_line(line)
            || patterns.is_hint_line(line)
            || is_lone_prompt(line, patterns)
            || is_spinner(line, patterns)
        {
            continue;
        }
        out.push(line.trim_end().to_string());
    }

    out.join("\n").trim().to_string()
}

/// A stray prompt-marker line with no content after the marker.
fn is_lone_prompt(line: &str, patterns: &ExtractorPatterns) -> bool {
    let trimmed = line.trim();
    trimmed
        .strip_prefix(patterns.prompt_marker.as_str())
        .is_some_and(|rest| rest.chars().all(|c| c == ' ' || c == '\u{a0}'))
}

/// A busy-glyph line is a spinner unless the opening parenthesis of a tool
/// invocation appears before the ellipsis (a completed tool call with
/// truncated arguments).
fn is_spinner(line: &str, patterns: &ExtractorPatterns) -> bool {
    let trimmed = line.trim_start();
    if !patterns.starts_with_busy_glyph(trimmed) {
        return false;
    }
    match trimmed.find(patterns.ellipsis.as_str()) {
        Some(ellipsis) => match trimmed.find('(') {
            Some(paren) => paren > ellipsis,
            None => true,
        },
        None => false,
    }
}
