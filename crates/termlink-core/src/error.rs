//! Error types for termlink.

use thiserror::Error;

/// Main error type for termlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level I/O failure (capture, send or connect)
    #[error("Transport error: {0}")]
    Transport(String),

    /// An execute() was issued while another run was active
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// No registered session matched the project hint
    #[error("No session matching '{hint}' (known projects: {})", known.join(", "))]
    NoSession {
        /// The hint that failed to resolve
        hint: String,
        /// Every project name currently known to the manager
        known: Vec<String>,
    },

    /// A session's transport failed its liveness check
    #[error("Session dead: {0}")]
    DeadSession(String),

    /// Malformed or unexpected bridge protocol traffic
    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    Pty(String),

    /// Session registry read/write failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error() {
        let err = Error::Transport("capture timed out".to_string());
        assert_eq!(err.to_string(), "Transport error: capture timed out");
    }

    #[test]
    fn test_session_busy_error() {
        let err = Error::SessionBusy("web-app".to_string());
        assert_eq!(err.to_string(), "Session busy: web-app");
    }

    #[test]
    fn test_no_session_enumerates_known_projects() {
        let err = Error::NoSession {
            hint: "nonexistent".to_string(),
            known: vec!["web-app".to_string(), "api-server".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No session matching 'nonexistent' (known projects: web-app, api-server)"
        );
    }

    #[test]
    fn test_dead_session_error() {
        let err = Error::DeadSession("api-server".to_string());
        assert_eq!(err.to_string(), "Session dead: api-server");
    }

    #[test]
    fn test_protocol_error() {
        let err = Error::Protocol("unexpected greeting".to_string());
        assert_eq!(err.to_string(), "Bridge protocol error: unexpected greeting");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_debug() {
        let err = Error::Registry("unreadable".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Registry"));
    }
}
