//! Configuration types for termlink.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Session controller timing
    pub controller: ControllerSettings,
    /// Terminal-state extraction pattern tables
    pub extractor: ExtractorPatterns,
    /// Filesystem session registry
    pub registry: RegistrySettings,
    /// Bridge server settings
    pub bridge: BridgeSettings,
    /// Transient-error retry policy
    pub retry: RetrySettings,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.controller.poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "controller.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.controller.timeout_secs == 0 {
            return Err(crate::Error::Config(
                "controller.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.extractor.prompt_marker.is_empty() {
            return Err(crate::Error::Config(
                "extractor.prompt_marker cannot be empty".to_string(),
            ));
        }
        if self.extractor.scan_lines == 0 {
            return Err(crate::Error::Config(
                "extractor.scan_lines must be > 0".to_string(),
            ));
        }
        if self.bridge.rows == 0 || self.bridge.cols == 0 {
            return Err(crate::Error::Config(
                "bridge dimensions must be > 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session controller timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Grace period after sending a prompt before the first poll, in seconds
    pub grace_period_secs: u64,
    /// Interval between buffer captures, in milliseconds
    pub poll_interval_ms: u64,
    /// Ceiling on a single execute() call, in seconds
    pub timeout_secs: u64,
    /// Delay between prompt body and the submit keystroke, in milliseconds
    pub settle_delay_ms: u64,
    /// Bound on a single transport capture/send call, in seconds
    pub io_timeout_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            poll_interval_ms: 1000,
            timeout_secs: 300,
            settle_delay_ms: 100,
            io_timeout_secs: 5,
        }
    }
}

impl ControllerSettings {
    /// Grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Execute timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Per-call transport I/O bound as a [`Duration`].
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Pattern tables driving idle detection and response extraction.
///
/// These are coupled to the exact rendering of the wrapped agent CLI and will
/// drift across its releases, so they live in configuration rather than in
/// the extraction algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorPatterns {
    /// Input prompt marker printed by the agent CLI
    pub prompt_marker: String,
    /// Glyphs the CLI animates while thinking or running a tool
    pub busy_glyphs: Vec<String>,
    /// Marker prefixed to completed tool-call lines
    pub tool_marker: String,
    /// Ellipsis character appended to busy/spinner lines
    pub ellipsis: String,
    /// Keybinding-hint fragments; lines containing one are never busy lines
    pub hint_fragments: Vec<String>,
    /// Block-quote continuation marker for wrapped input echo
    pub quote_marker: String,
    /// Characters a separator-only line is made of
    pub separator_chars: String,
    /// How many trailing lines the idle heuristic scans
    pub scan_lines: usize,
    /// Maximum length of a line that can count as a busy indicator
    pub max_busy_line_len: usize,
    /// How many prompt characters the echo anchor matches on
    pub prompt_prefix_len: usize,
    /// How many context lines the trailing-context anchor uses
    pub context_lines: usize,
}

impl Default for ExtractorPatterns {
    fn default() -> Self {
        Self {
            prompt_marker: "❯".to_string(),
            busy_glyphs: ["✢", "✳", "✶", "✻", "✽", "·", "*", "●", "◐", "◓", "◑", "◒", "⏺"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tool_marker: "⏺".to_string(),
            ellipsis: "…".to_string(),
            hint_fragments: ["shift+tab", "esc to", "ctrl+o"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            quote_marker: ">".to_string(),
            separator_chars: "─│┌┐└┘├┤┬┴┼╭╮╰╯━┃═║╔╗╚╝╠╣╦╩╬╌┄┈".to_string(),
            scan_lines: 15,
            max_busy_line_len: 80,
            prompt_prefix_len: 15,
            context_lines: 4,
        }
    }
}

impl ExtractorPatterns {
    /// Check whether a line starts with one of the busy glyphs.
    pub fn starts_with_busy_glyph(&self, line: &str) -> bool {
        self.busy_glyphs.iter().any(|g| line.starts_with(g.as_str()))
    }

    /// Check whether a trimmed line consists entirely of separator characters.
    pub fn is_separator_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        !trimmed.is_empty() && trimmed.chars().all(|c| self.separator_chars.contains(c))
    }

    /// Check whether a line contains a keybinding hint fragment.
    pub fn is_hint_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.hint_fragments.iter().any(|h| lower.contains(h.as_str()))
    }
}

/// Filesystem session registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Directory holding one descriptor file per live session
    pub dir: PathBuf,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("termlink-sessions"),
        }
    }
}

/// Bridge server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// TCP listen port
    pub port: u16,
    /// Command spawned inside the PTY
    pub command: String,
    /// Fallback terminal rows when the real size is unavailable
    pub rows: u16,
    /// Fallback terminal columns when the real size is unavailable
    pub cols: u16,
    /// Screen snapshot broadcast cadence, in milliseconds
    pub snapshot_interval_ms: u64,
    /// PTY read-poll interval, in milliseconds
    pub read_interval_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            port: 50001,
            command: "claude".to_string(),
            rows: 30,
            cols: 120,
            snapshot_interval_ms: 500,
            read_interval_ms: 50,
        }
    }
}

impl BridgeSettings {
    /// Snapshot cadence as a [`Duration`].
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    /// PTY read-poll interval as a [`Duration`].
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }
}

/// Transient-error retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per logical execute
    pub max_attempts: u32,
    /// Substrings identifying a retryable error
    pub transient_markers: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_markers: ["timeout", "connection", "rate", "429", "502", "503"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetrySettings {
    /// Check whether an error message looks transient.
    pub fn is_transient(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.transient_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.controller.grace_period_secs, 5);
        assert_eq!(config.controller.poll_interval_ms, 1000);
        assert_eq!(config.controller.timeout_secs, 300);
        assert_eq!(config.extractor.prompt_marker, "❯");
        assert_eq!(config.bridge.port, 50001);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_poll_interval() {
        let mut config = Config::default();
        config.controller.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_prompt_marker() {
        let mut config = Config::default();
        config.extractor.prompt_marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
controller:
  grace_period_secs: 2
  poll_interval_ms: 500
  timeout_secs: 120

extractor:
  prompt_marker: ">"
  scan_lines: 10

bridge:
  port: 60001
  command: agent
  rows: 40
  cols: 160

retry:
  max_attempts: 2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.controller.grace_period_secs, 2);
        assert_eq!(config.controller.poll_interval_ms, 500);
        assert_eq!(config.extractor.prompt_marker, ">");
        assert_eq!(config.extractor.scan_lines, 10);
        assert_eq!(config.bridge.port, 60001);
        assert_eq!(config.bridge.command, "agent");
        assert_eq!(config.retry.max_attempts, 2);
        // Unspecified sections keep their defaults
        assert_eq!(config.controller.settle_delay_ms, 100);
        assert_eq!(config.extractor.ellipsis, "…");
    }

    #[test]
    fn test_separator_line() {
        let patterns = ExtractorPatterns::default();
        assert!(patterns.is_separator_line("────────────"));
        assert!(patterns.is_separator_line("  ╭──────╮  "));
        assert!(!patterns.is_separator_line("── result ──"));
        assert!(!patterns.is_separator_line(""));
    }

    #[test]
    fn test_hint_line() {
        let patterns = ExtractorPatterns::default();
        assert!(patterns.is_hint_line("  shift+tab to cycle"));
        assert!(patterns.is_hint_line("press Esc to interrupt"));
        assert!(!patterns.is_hint_line("normal output"));
    }

    #[test]
    fn test_busy_glyph_prefix() {
        let patterns = ExtractorPatterns::default();
        assert!(patterns.starts_with_busy_glyph("✻ Thinking…"));
        assert!(patterns.starts_with_busy_glyph("⏺ Read(main.rs)…"));
        assert!(!patterns.starts_with_busy_glyph("plain text"));
    }

    #[test]
    fn test_transient_markers() {
        let retry = RetrySettings::default();
        assert!(retry.is_transient("Transport error: connection reset"));
        assert!(retry.is_transient("HTTP 429 Too Many Requests"));
        assert!(retry.is_transient("request Timeout"));
        assert!(!retry.is_transient("invalid argument"));
    }
}
