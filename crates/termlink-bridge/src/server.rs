//! The bridge server: PTY + emulator + observer fan-out.

use std::io::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use termlink_core::{protocol, BridgeSettings, Error, Result, WireMessage};
use termlink_emulator::{Emulator, PtyHandle};

/// Pause between a pasted prompt body and its submit keystroke, so the
/// wrapped CLI's input widget treats them as type-then-press rather than one
/// paste.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Cadence of the child-exit liveness poll.
const EXIT_POLL: Duration = Duration::from_millis(200);

struct Observer {
    id: u64,
    tx: mpsc::UnboundedSender<WireMessage>,
}

/// One bridge: a PTY-wrapped agent CLI, the emulator mirroring its screen,
/// and the set of connected observers.
///
/// Observers all see the same screen; input from any of them (and from the
/// local operator, in attended mode) lands in the same PTY.
pub struct BridgeServer {
    settings: BridgeSettings,
    pty: Arc<PtyHandle>,
    emulator: Arc<Mutex<Emulator>>,
    observers: Arc<Mutex<Vec<Observer>>>,
    next_observer_id: AtomicU64,
    echo_stdout: bool,
}

impl BridgeServer {
    /// Spawn the agent CLI in a PTY sized to the real terminal when one is
    /// attached, or the configured fallback size otherwise.
    pub fn spawn(
        settings: BridgeSettings,
        args: &[String],
        cwd: Option<String>,
        echo_stdout: bool,
    ) -> Result<Arc<Self>> {
        let (cols, rows) =
            crossterm::terminal::size().unwrap_or((settings.cols, settings.rows));
        let pty = PtyHandle::spawn(&settings.command, args, rows, cols, cwd)?;
        Ok(Arc::new(Self {
            pty: Arc::new(pty),
            emulator: Arc::new(Mutex::new(Emulator::new(rows, cols))),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(0),
            echo_stdout,
            settings,
        }))
    }

    /// The wrapped PTY.
    pub fn pty(&self) -> &PtyHandle {
        &self.pty
    }

    /// Render the current screen.
    pub fn screen(&self) -> String {
        self.lock_emulator().render()
    }

    /// Resize the PTY and the emulator together.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.pty.resize(rows, cols)?;
        self.lock_emulator().resize(rows, cols);
        Ok(())
    }

    /// Kill the wrapped agent; the serve loop notices and shuts down.
    pub fn shutdown(&self) {
        let _ = self.pty.kill();
    }

    fn lock_emulator(&self) -> std::sync::MutexGuard<'_, Emulator> {
        self.emulator.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(&self, message: &WireMessage) {
        self.lock_observers()
            .retain(|observer| observer.tx.send(message.clone()).is_ok());
    }

    /// Serve observers on `listener` until the wrapped agent exits.
    ///
    /// Runs the PTY read pump and the snapshot broadcaster as background
    /// tasks, then accepts connections. On agent exit every observer gets a
    /// final `status {alive: false}` before the sockets close.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("listener address: {e}")))?;
        info!("Bridge serving '{}' on {}", self.settings.command, addr);

        let pump = tokio::spawn(Arc::clone(self).read_pump());
        let snapshots = tokio::spawn(Arc::clone(self).snapshot_loop());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Observer connected from {}", peer);
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_observer(stream).await {
                                    debug!("Observer {} ended: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
                _ = self.agent_exit() => {
                    info!("Agent process exited, notifying observers");
                    self.broadcast(&WireMessage::Status { alive: false });
                    break;
                }
            }
        }

        // Give final messages a moment to flush before writer tasks drop
        tokio::time::sleep(Duration::from_millis(100)).await;
        pump.abort();
        snapshots.abort();
        self.lock_observers().clear();
        Ok(())
    }

    async fn agent_exit(&self) {
        loop {
            if !self.pty.is_alive() {
                return;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Drain PTY output into the emulator (and the local terminal, when
    /// attended).
    async fn read_pump(self: Arc<Self>) {
        loop {
            let chunk = match self.pty.read() {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("PTY read ended: {}", e);
                    return;
                }
            };
            if chunk.is_empty() {
                tokio::time::sleep(self.settings.read_interval()).await;
                continue;
            }
            if self.echo_stdout {
                // Query sequences are stripped so the operator's terminal
                // doesn't answer them into the local shell
                let filtered = filter_terminal_queries(&chunk);
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(&filtered);
                let _ = stdout.flush();
            }
            self.lock_emulator().feed(&chunk);
        }
    }

    /// Broadcast the rendered screen whenever it changes.
    async fn snapshot_loop(self: Arc<Self>) {
        let mut last = String::new();
        loop {
            tokio::time::sleep(self.settings.snapshot_interval()).await;
            let current = self.lock_emulator().render();
            if current != last {
                self.broadcast(&WireMessage::Output {
                    data: current.clone(),
                });
                last = current;
            }
        }
    }

    async fn handle_observer(self: &Arc<Self>, stream: TcpStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();

        let greeting = WireMessage::Status {
            alive: self.pty.is_alive(),
        };
        write_half
            .write_all(greeting.encode()?.as_bytes())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        // A fresh observer gets the current screen without waiting for the
        // next change
        let screen = self.screen();
        if !screen.is_empty() {
            write_half
                .write_all(WireMessage::Output { data: screen }.encode()?.as_bytes())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<WireMessage>();
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.lock_observers().push(Observer { id, tx });

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Ok(line) = message.encode() else { continue };
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let mut lines = BufReader::new(read_half).lines();
        let result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => match WireMessage::decode(&line) {
                    Ok(WireMessage::Input { data }) => {
                        if let Err(e) = self.route_input(&data).await {
                            break Err(e);
                        }
                    }
                    Ok(other) => {
                        debug!("Observer {} sent unexpected {:?}", id, other);
                    }
                    Err(e) => {
                        warn!("Observer {} sent malformed line: {}", id, e);
                    }
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(Error::Transport(e.to_string())),
            }
        };

        self.lock_observers().retain(|observer| observer.id != id);
        writer.abort();
        debug!("Observer {} disconnected", id);
        result
    }

    /// Write observer input into the PTY.
    async fn route_input(&self, data: &str) -> Result<()> {
        if data == protocol::INTERRUPT {
            debug!("Observer interrupt");
        }
        deliver_input(data, SETTLE_DELAY, |bytes| {
            self.pty.write(bytes).map(|_| ())
        })
        .await
    }
}

/// Deliver one inbound `input` payload to a PTY write sink.
///
/// A multi-character payload with a trailing newline is a submitted prompt:
/// the body is typed first, then after the settle pause the carriage return
/// goes as a second write, so the wrapped CLI's input widget sees
/// type-then-press rather than one paste. Everything else (single keys,
/// control bytes) passes through as one write.
async fn deliver_input<W>(data: &str, settle: Duration, mut write: W) -> Result<()>
where
    W: FnMut(&[u8]) -> Result<()>,
{
    if data == protocol::INTERRUPT {
        return write(data.as_bytes());
    }
    let body = data.trim_end_matches(['\r', '\n']);
    if body.len() < data.len() && !body.is_empty() {
        write(body.as_bytes())?;
        tokio::time::sleep(settle).await;
        write(b"\r")
    } else {
        write(data.as_bytes())
    }
}

/// Strip terminal query sequences (device attributes, status reports) from a
/// raw output chunk, so echoing it to the operator's terminal doesn't make
/// that terminal type answers into the local shell.
pub fn filter_terminal_queries(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == 0x1b && i + 1 < data.len() && data[i + 1] == b'[' {
            // Find the CSI final byte
            let mut j = i + 2;
            while j < data.len() && !(0x40..=0x7e).contains(&data[j]) {
                j += 1;
            }
            if j < data.len() && (data[j] == b'c' || data[j] == b'n') {
                i = j + 1;
                continue;
            }
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    async fn record_writes(data: &str, settle: Duration) -> Vec<(tokio::time::Instant, Vec<u8>)> {
        let writes = RefCell::new(Vec::new());
        deliver_input(data, settle, |bytes| {
            writes.borrow_mut().push((tokio::time::Instant::now(), bytes.to_vec()));
            Ok(())
        })
        .await
        .unwrap();
        writes.into_inner()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submitted_prompt_splits_with_settle_gap() {
        let settle = Duration::from_millis(100);
        let writes = record_writes("hello bridge\n", settle).await;

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1, b"hello bridge");
        assert_eq!(writes[1].1, b"\r");
        assert!(writes[1].0 - writes[0].0 >= settle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crlf_terminator_also_splits() {
        let writes = record_writes("ship it\r\n", Duration::from_millis(100)).await;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1, b"ship it");
        assert_eq!(writes[1].1, b"\r");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bare_return_passes_unsplit() {
        let writes = record_writes("\r", Duration::from_millis(100)).await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, b"\r");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_key_passes_unsplit() {
        let writes = record_writes("x", Duration::from_millis(100)).await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, b"x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_byte_passes_unsplit() {
        let writes = record_writes(protocol::INTERRUPT, Duration::from_millis(100)).await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, vec![0x03]);
    }

    #[test]
    fn test_filter_drops_device_attribute_query() {
        let filtered = filter_terminal_queries(b"before\x1b[cafter");
        assert_eq!(filtered, b"beforeafter");
    }

    #[test]
    fn test_filter_drops_status_report_query() {
        let filtered = filter_terminal_queries(b"x\x1b[6ny");
        assert_eq!(filtered, b"xy");
    }

    #[test]
    fn test_filter_keeps_sgr_and_text() {
        let input = b"\x1b[1;32mgreen\x1b[0m plain";
        assert_eq!(filter_terminal_queries(input), input);
    }

    #[test]
    fn test_filter_keeps_cursor_moves() {
        let input = b"\x1b[2;3Hx";
        assert_eq!(filter_terminal_queries(input), input);
    }
}
