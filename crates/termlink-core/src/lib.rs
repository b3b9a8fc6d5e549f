//! # termlink-core
//!
//! Core types for termlink.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other termlink crates. It provides:
//!
//! - Error types
//! - YAML configuration (timing, extraction pattern tables, registry, bridge)
//! - Session descriptors and the filesystem session registry
//! - The bridge wire protocol (newline-delimited JSON messages)
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other termlink crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod protocol;
pub mod registry;

pub use config::{
    BridgeSettings, Config, ControllerSettings, ExtractorPatterns, RegistrySettings,
    RetrySettings,
};
pub use descriptor::{SessionDescriptor, TransportKind};
pub use error::{Error, Result};
pub use protocol::WireMessage;
pub use registry::SessionRegistry;
