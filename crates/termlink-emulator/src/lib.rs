//! # termlink-emulator
//!
//! Virtual terminal emulation for the termlink bridge server.
//!
//! This crate provides:
//! - A VTE-driven [`Screen`] whose rendered text grid is the single source of
//!   truth for "what is currently on the agent's terminal"
//! - PTY lifecycle management ([`PtyHandle`]) for the spawned agent CLI
//!
//! The screen is text-only: the bridge broadcasts plain renders, so colors
//! and attributes are parsed and discarded.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pty;
pub mod screen;

pub use pty::PtyHandle;
pub use screen::{Emulator, Screen};
