//! Session descriptors shared between the manager and registration hooks.

use serde::{Deserialize, Serialize};

/// Which transport a registered session is reachable through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Terminal-multiplexer pane on this host
    #[default]
    Local,
    /// Bridge server on another host, reachable over TCP
    Remote,
    /// Structured-API fallback with no terminal at all
    Structured,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Remote => write!(f, "remote"),
            TransportKind::Structured => write!(f, "structured"),
        }
    }
}

/// One registered agent terminal session.
///
/// Created by an external registration hook (or the bridge server itself)
/// when an agent terminal starts, and removed when it ends. The session
/// manager only ever reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Project name, the unique registry key
    pub project: String,

    /// Transport kind; descriptors written before the field existed are local
    #[serde(rename = "type", default)]
    pub kind: TransportKind,

    /// Multiplexer pane identifier (local sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane: Option<String>,

    /// Bridge host (remote sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Bridge port (remote sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Working directory of the agent process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    /// RFC 3339 registration timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

impl SessionDescriptor {
    /// Descriptor for a local multiplexer pane.
    pub fn local(project: impl Into<String>, pane: impl Into<String>, work_dir: Option<String>) -> Self {
        Self {
            project: project.into(),
            kind: TransportKind::Local,
            pane: Some(pane.into()),
            host: None,
            port: None,
            work_dir,
            registered_at: Some(chrono::Local::now().to_rfc3339()),
        }
    }

    /// Descriptor for a remote bridge server.
    pub fn remote(
        project: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        work_dir: Option<String>,
    ) -> Self {
        Self {
            project: project.into(),
            kind: TransportKind::Remote,
            pane: None,
            host: Some(host.into()),
            port: Some(port),
            work_dir,
            registered_at: Some(chrono::Local::now().to_rfc3339()),
        }
    }

    /// Human-readable endpoint for logs.
    pub fn endpoint(&self) -> String {
        match self.kind {
            TransportKind::Local => self.pane.clone().unwrap_or_default(),
            TransportKind::Remote => format!(
                "{}:{}",
                self.host.as_deref().unwrap_or("?"),
                self.port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
            ),
            TransportKind::Structured => "structured".to_string(),
        }
    }
}
