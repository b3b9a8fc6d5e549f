//! The transport seam: one enum, two ways to reach an agent terminal.

use termlink_core::{Result, TransportKind};

use crate::local::PaneTransport;
use crate::remote::BridgeTransport;

/// Control sequences a transport can deliver out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Cancel the agent's current turn (Ctrl-C semantics)
    Interrupt,
}

/// A connection to one agent terminal.
///
/// Every variant answers the same four questions: send text, capture the
/// current buffer, deliver a control signal, and report liveness. The
/// controller never matches on the variant itself.
#[derive(Debug)]
pub enum Transport {
    /// Multiplexer pane on this host
    Local(PaneTransport),
    /// Bridge server reached over TCP
    Remote(BridgeTransport),
}

impl Transport {
    /// Which kind of transport this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Local(_) => TransportKind::Local,
            Transport::Remote(_) => TransportKind::Remote,
        }
    }

    /// Send prompt text followed by a submit keystroke.
    pub async fn send(&self, text: &str) -> Result<()> {
        match self {
            Transport::Local(pane) => pane.send(text).await,
            Transport::Remote(bridge) => bridge.send(text).await,
        }
    }

    /// Capture the current terminal buffer as text.
    pub async fn capture(&self) -> Result<String> {
        match self {
            Transport::Local(pane) => pane.capture().await,
            Transport::Remote(bridge) => bridge.capture().await,
        }
    }

    /// Deliver a control signal.
    pub async fn signal(&self, signal: ControlSignal) -> Result<()> {
        match self {
            Transport::Local(pane) => pane.signal(signal).await,
            Transport::Remote(bridge) => bridge.signal(signal).await,
        }
    }

    /// Cheap liveness check.
    pub async fn is_alive(&self) -> bool {
        match self {
            Transport::Local(pane) => pane.is_alive().await,
            Transport::Remote(bridge) => bridge.is_alive(),
        }
    }

    /// Tear down any background resources. Local panes have none.
    pub async fn disconnect(&self) {
        if let Transport::Remote(bridge) = self {
            bridge.disconnect().await;
        }
    }
}
