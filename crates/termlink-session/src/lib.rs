//! # termlink-session
//!
//! Session control for termlink: transports that reach an agent terminal,
//! the controller that drives one prompt/response turn over a transport, and
//! the manager that discovers sessions and routes requests to them.
//!
//! - [`Transport`] - local multiplexer pane or remote bridge connection
//! - [`SessionController`] - send a prompt, poll the buffer, stream the
//!   extracted response
//! - [`SessionManager`] - registry-backed discovery, hint resolution,
//!   fallback routing and transient-error retry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod local;
pub mod manager;
pub mod remote;
pub mod transport;

pub use controller::{ExecuteEvent, ExecuteStream, ExecutionResult, SessionController, SessionState};
pub use local::PaneTransport;
pub use manager::{FallbackAgent, SessionManager};
pub use remote::BridgeTransport;
pub use transport::{ControlSignal, Transport};
