//! Local transport: a terminal-multiplexer pane driven through the `tmux`
//! command-line interface.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use termlink_core::{ControllerSettings, Error, Result};

use crate::transport::ControlSignal;

/// One tmux pane holding a live agent CLI.
///
/// Every operation shells out to `tmux` and is bounded by the configured I/O
/// timeout so a wedged multiplexer server cannot stall the poll loop.
#[derive(Debug, Clone)]
pub struct PaneTransport {
    pane: String,
    settle_delay: Duration,
    io_timeout: Duration,
}

impl PaneTransport {
    /// Create a transport for the given pane identifier (e.g. `%3` or
    /// `session:window.pane`).
    pub fn new(pane: impl Into<String>, settings: &ControllerSettings) -> Self {
        Self {
            pane: pane.into(),
            settle_delay: settings.settle_delay(),
            io_timeout: settings.io_timeout(),
        }
    }

    /// The pane identifier.
    pub fn pane(&self) -> &str {
        &self.pane
    }

    async fn tmux(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = timeout(self.io_timeout, Command::new("tmux").args(args).output())
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "tmux {} timed out after {:?}",
                    args.first().unwrap_or(&"?"),
                    self.io_timeout
                ))
            })?
            .map_err(|e| Error::Transport(format!("tmux spawn failed: {e}")))?;
        if !output.status.success() {
            return Err(Error::Transport(format!(
                "tmux {} failed: {}",
                args.first().unwrap_or(&"?"),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Capture the pane's visible buffer, joining wrapped lines.
    pub async fn capture(&self) -> Result<String> {
        let output = self
            .tmux(&["capture-pane", "-p", "-J", "-t", &self.pane])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Type `text` literally into the pane, let the CLI's input widget settle,
    /// then press Enter.
    ///
    /// The two-step send is load-bearing: pasting text and newline together
    /// makes some TUI input widgets treat the newline as part of the paste
    /// instead of a submit.
    pub async fn send(&self, text: &str) -> Result<()> {
        debug!("Sending {} chars to pane {}", text.len(), self.pane);
        self.tmux(&["send-keys", "-t", &self.pane, "-l", "--", text])
            .await?;
        tokio::time::sleep(self.settle_delay).await;
        self.tmux(&["send-keys", "-t", &self.pane, "Enter"]).await?;
        Ok(())
    }

    /// Deliver a control signal to the pane.
    pub async fn signal(&self, signal: ControlSignal) -> Result<()> {
        match signal {
            ControlSignal::Interrupt => {
                self.tmux(&["send-keys", "-t", &self.pane, "C-c"]).await?;
            }
        }
        Ok(())
    }

    /// Whether the pane still exists.
    pub async fn is_alive(&self) -> bool {
        self.tmux(&["has-session", "-t", &self.pane]).await.is_ok()
    }
}
