//! # termlink-bridge
//!
//! TCP bridge server: wraps an agent CLI in a PTY, mirrors its screen through
//! a virtual terminal emulator, and serves screen snapshots plus input
//! routing to observers over the newline-delimited JSON wire protocol.
//!
//! The binary is attended by default (the operator's own terminal stays
//! interactive while observers are connected); `--no-stdin` runs it headless.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod input;
pub mod register;
pub mod server;

pub use server::BridgeServer;
