//! # termlink-extract
//!
//! Terminal-state extraction for termlink.
//!
//! This crate provides the pure functions that turn a noisy, ANSI-decorated,
//! spinner-animated terminal buffer into usable signal:
//!
//! - `strip_decoration`: remove escape sequences and control bytes
//! - `is_idle`: decide whether the wrapped agent CLI has finished a turn
//! - `extract_response`: diff two buffer snapshots into new response text
//! - `tool_names`: pull tool names out of completed tool-call lines
//!
//! All functions are total over arbitrary text and never fail. The glyph and
//! marker tables they match against are configuration
//! ([`termlink_core::ExtractorPatterns`]), not constants, because they track
//! the exact rendering of the wrapped CLI.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ansi;
pub mod idle;
pub mod response;

pub use ansi::strip_decoration;
pub use idle::is_idle;
pub use response::{extract_response, tool_names};
