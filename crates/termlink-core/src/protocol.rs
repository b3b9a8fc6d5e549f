//! Bridge wire protocol: newline-delimited UTF-8 JSON, one object per line.
//!
//! The protocol carries no authentication or encryption; it assumes a trusted
//! network path such as a host-only virtual network.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The interrupt control byte sent to cancel a running agent turn.
pub const INTERRUPT: &str = "\u{3}";

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Server → client liveness notice; sent on connect and on shutdown
    Status {
        /// Whether the wrapped agent process is (still) running
        alive: bool,
    },
    /// Server → client full rendered screen, sent on change
    Output {
        /// The rendered text of the current screen
        data: String,
    },
    /// Client → server text or raw control bytes for the PTY
    Input {
        /// Payload to write into the PTY
        data: String,
    },
}

impl WireMessage {
    /// Serialize to a single newline-terminated line.
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line (with or without its trailing newline).
    pub fn decode(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(Error::Protocol("empty line".to_string()));
        }
        serde_json::from_str(trimmed).map_err(|e| Error::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_encoding() {
        let msg = WireMessage::Status { alive: true };
        let line = msg.encode().unwrap();
        assert_eq!(line, "{\"type\":\"status\",\"alive\":true}\n");
    }

    #[test]
    fn test_output_roundtrip() {
        let msg = WireMessage::Output {
            data: "❯ hello\nworld".to_string(),
        };
        let line = msg.encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(WireMessage::decode(&line).unwrap(), msg);
    }

    #[test]
    fn test_input_decoding() {
        let msg = WireMessage::decode("{\"type\":\"input\",\"data\":\"hello\\n\"}").unwrap();
        assert_eq!(
            msg,
            WireMessage::Input {
                data: "hello\n".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(WireMessage::decode("").is_err());
        assert!(WireMessage::decode("not json").is_err());
        assert!(WireMessage::decode("{\"type\":\"bogus\"}").is_err());
    }

    #[test]
    fn test_interrupt_byte() {
        assert_eq!(INTERRUPT.as_bytes(), &[0x03]);
    }
}
