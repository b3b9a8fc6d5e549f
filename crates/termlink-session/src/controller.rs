//! Per-session controller: drives one prompt/response turn over a transport
//! by polling the terminal buffer and streaming the extracted response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use termlink_core::{ControllerSettings, Error, ExtractorPatterns, Result};
use termlink_extract::{extract_response, is_idle, tool_names};

use crate::transport::{ControlSignal, Transport};

/// What one execute() produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Extracted response text; empty when nothing distinguishable appeared
    pub text: String,
    /// Names of tools the agent invoked during the turn, in order
    pub tools_used: Vec<String>,
    /// Project name of the session that produced this
    pub project: String,
}

/// One event on an execute stream.
#[derive(Debug)]
pub enum ExecuteEvent {
    /// Partial response text observed mid-turn; always the full text so far
    Update(String),
    /// Terminal event, emitted exactly once
    Final(Result<ExecutionResult>),
}

/// Receiver side of a running execution.
///
/// Yields zero or more `Update`s followed by exactly one `Final`, then ends.
#[derive(Debug)]
pub struct ExecuteStream {
    rx: mpsc::UnboundedReceiver<ExecuteEvent>,
}

impl ExecuteStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ExecuteEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<ExecuteEvent> {
        self.rx.recv().await
    }

    /// Drain the stream, discarding updates, and return the final result.
    pub async fn collect(mut self) -> Result<ExecutionResult> {
        while let Some(event) = self.next().await {
            if let ExecuteEvent::Final(result) = event {
                return result;
            }
        }
        Err(Error::Other("execution ended without a final result".to_string()))
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No execution in flight
    Idle,
    /// A prompt has been sent and the poll loop is active
    Running,
    /// An interrupt was requested; the poll loop is winding down
    Interrupted,
}

/// Controller for one live agent terminal session.
///
/// At most one execution runs at a time; a second `execute()` while one is in
/// flight fails with [`Error::SessionBusy`] rather than queueing, because two
/// interleaved prompts in one terminal corrupt both responses.
pub struct SessionController {
    project: String,
    work_dir: Option<String>,
    transport: Transport,
    settings: ControllerSettings,
    patterns: ExtractorPatterns,
    state: Mutex<SessionState>,
    interrupted: AtomicBool,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("project", &self.project)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller for a project over an established transport.
    pub fn new(
        project: impl Into<String>,
        work_dir: Option<String>,
        transport: Transport,
        settings: ControllerSettings,
        patterns: ExtractorPatterns,
    ) -> Self {
        Self {
            project: project.into(),
            work_dir,
            transport,
            settings,
            patterns,
            state: Mutex::new(SessionState::Idle),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Project name.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Working directory recorded at registration, if any.
    pub fn work_dir(&self) -> Option<&str> {
        self.work_dir.as_deref()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether an execution is currently in flight.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), SessionState::Running | SessionState::Interrupted)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Send a prompt and stream the response as it accumulates.
    ///
    /// Returns immediately with the stream; the poll loop runs on a spawned
    /// task. Fails with [`Error::SessionBusy`] if a turn is already running.
    pub fn execute(self: &Arc<Self>, prompt: &str) -> Result<ExecuteStream> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SessionState::Idle {
                return Err(Error::SessionBusy(self.project.clone()));
            }
            *state = SessionState::Running;
        }
        self.interrupted.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Arc::clone(self);
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            let result = controller.run_turn(&prompt, &tx).await;
            controller.set_state(SessionState::Idle);
            let _ = tx.send(ExecuteEvent::Final(result));
        });

        Ok(ExecuteStream::new(rx))
    }

    async fn run_turn(
        &self,
        prompt: &str,
        tx: &mpsc::UnboundedSender<ExecuteEvent>,
    ) -> Result<ExecutionResult> {
        let baseline = self.transport.capture().await?;

        // Multi-line prompts are flattened: a raw newline mid-paste would
        // submit the prompt early.
        let flattened = prompt.replace(['\r', '\n'], " ");
        self.transport.send(&flattened).await?;
        info!("Sent prompt to '{}' ({} chars)", self.project, flattened.len());

        tokio::time::sleep(self.settings.grace_period()).await;

        let deadline = Instant::now() + self.settings.timeout();
        let mut last_streamed = String::new();
        let mut completed = false;

        while Instant::now() < deadline {
            if self.interrupted.load(Ordering::SeqCst) {
                info!("Execution on '{}' interrupted", self.project);
                break;
            }

            let current = self.transport.capture().await?;
            let so_far = extract_response(&baseline, &current, prompt, &self.patterns);
            if !so_far.is_empty() && so_far != last_streamed {
                let _ = tx.send(ExecuteEvent::Update(so_far.clone()));
                last_streamed = so_far;
            }

            if current != baseline && is_idle(&current, &self.patterns) {
                debug!("'{}' is idle, turn complete", self.project);
                completed = true;
                break;
            }

            tokio::time::sleep(self.settings.poll_interval()).await;
        }

        if !completed && !self.interrupted.load(Ordering::SeqCst) {
            warn!(
                "Execution on '{}' hit the {}s ceiling; returning what accumulated",
                self.project, self.settings.timeout_secs
            );
        }

        let final_buffer = self.transport.capture().await?;
        let text = extract_response(&baseline, &final_buffer, prompt, &self.patterns);
        if text.is_empty() {
            debug!("No distinguishable response extracted for '{}'", self.project);
        }
        Ok(ExecutionResult {
            tools_used: tool_names(&text, &self.patterns),
            text,
            project: self.project.clone(),
        })
    }

    /// Request cancellation of the in-flight turn.
    ///
    /// Sends the interrupt signal through the transport and flags the poll
    /// loop, which exits at the top of its next iteration. Returns false when
    /// nothing was running.
    pub async fn interrupt(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SessionState::Running {
                return false;
            }
            *state = SessionState::Interrupted;
        }
        self.interrupted.store(true, Ordering::SeqCst);
        if let Err(e) = self.transport.signal(ControlSignal::Interrupt).await {
            warn!("Interrupt delivery to '{}' failed: {}", self.project, e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use termlink_core::WireMessage;

    fn fast_settings() -> ControllerSettings {
        ControllerSettings {
            grace_period_secs: 0,
            poll_interval_ms: 50,
            timeout_secs: 5,
            settle_delay_ms: 10,
            io_timeout_secs: 5,
        }
    }

    /// A bridge that answers the first input with a canned screen.
    async fn scripted_bridge(response_screen: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let greeting = WireMessage::Status { alive: true }.encode().unwrap();
            write_half.write_all(greeting.as_bytes()).await.unwrap();

            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if matches!(WireMessage::decode(&line), Ok(WireMessage::Input { .. })) {
                    let msg = WireMessage::Output {
                        data: response_screen.to_string(),
                    }
                    .encode()
                    .unwrap();
                    write_half.write_all(msg.as_bytes()).await.unwrap();
                }
            }
        });
        addr
    }

    async fn remote_controller(addr: std::net::SocketAddr) -> Arc<SessionController> {
        let bridge = crate::remote::BridgeTransport::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        Arc::new(SessionController::new(
            "web-app",
            None,
            Transport::Remote(bridge),
            fast_settings(),
            ExtractorPatterns::default(),
        ))
    }

    #[tokio::test]
    async fn test_execute_streams_and_completes() {
        let addr = scripted_bridge("❯ previous\nresult line\n❯ hello\n(done)\n❯ ").await;
        let controller = remote_controller(addr).await;

        let mut stream = controller.execute("hello").unwrap();
        let mut updates = Vec::new();
        let mut final_result = None;
        while let Some(event) = stream.next().await {
            match event {
                ExecuteEvent::Update(text) => updates.push(text),
                ExecuteEvent::Final(result) => final_result = Some(result),
            }
        }

        let result = final_result.unwrap().unwrap();
        assert_eq!(result.text, "(done)");
        assert!(result.tools_used.is_empty());
        assert_eq!(result.project, "web-app");
        assert!(updates.iter().all(|u| u == "(done)"));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_second_execute_rejected_while_running() {
        // Screen without a trailing prompt: the turn never looks idle
        let addr = scripted_bridge("❯ hello\n✻ Thinking…").await;
        let controller = remote_controller(addr).await;

        let stream = controller.execute("hello").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = controller.execute("again").unwrap_err();
        assert!(matches!(err, Error::SessionBusy(_)));

        assert!(controller.interrupt().await);
        let result = stream.collect().await.unwrap();
        // Interrupted turn still reports what accumulated
        assert_eq!(result.project, "web-app");
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_interrupt_with_nothing_running() {
        let addr = scripted_bridge("❯ ").await;
        let controller = remote_controller(addr).await;
        assert!(!controller.interrupt().await);
    }

    #[tokio::test]
    async fn test_tool_calls_reported() {
        let addr =
            scripted_bridge("❯ hello\n⏺ Read(src/main.rs)…\n⏺ Edit(src/main.rs)…\nPatched it.\n❯ ")
                .await;
        let controller = remote_controller(addr).await;

        let result = controller.execute("hello").unwrap().collect().await.unwrap();
        assert_eq!(result.tools_used, vec!["Read", "Edit"]);
        assert!(result.text.contains("Patched it."));
    }
}
