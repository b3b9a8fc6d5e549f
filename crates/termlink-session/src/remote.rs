//! Remote transport: a TCP connection to a bridge server, speaking the
//! newline-delimited JSON wire protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use termlink_core::{protocol, Error, Result, WireMessage};

use crate::transport::ControlSignal;

/// Lines retained in the rolling screen buffer.
pub const MAX_BUFFER_LINES: usize = 2000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A live connection to one bridge server.
///
/// A background task appends every `output` message to a rolling line buffer;
/// `capture()` just joins it. A `status {alive: false}` or a dropped socket
/// marks the transport dead, and every later send fails fast.
pub struct BridgeTransport {
    endpoint: String,
    alive: Arc<AtomicBool>,
    buffer: Arc<Mutex<Vec<String>>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    receiver: JoinHandle<()>,
}

impl std::fmt::Debug for BridgeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeTransport")
            .field("endpoint", &self.endpoint)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl BridgeTransport {
    /// Connect to a bridge server and wait for its greeting.
    ///
    /// The greeting doubles as the liveness probe: a server whose agent has
    /// already exited answers `alive: false` and the connect fails.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let endpoint = format!("{host}:{port}");
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| Error::Transport(format!("connect to {endpoint} timed out")))?
            .map_err(|e| Error::Transport(format!("connect to {endpoint}: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let greeting = timeout(CONNECT_TIMEOUT, lines.next_line())
            .await
            .map_err(|_| Error::Protocol(format!("{endpoint}: no greeting within {CONNECT_TIMEOUT:?}")))?
            .map_err(|e| Error::Transport(format!("{endpoint}: {e}")))?
            .ok_or_else(|| Error::Protocol(format!("{endpoint}: closed before greeting")))?;

        match WireMessage::decode(&greeting)? {
            WireMessage::Status { alive: true } => {}
            WireMessage::Status { alive: false } => {
                return Err(Error::DeadSession(endpoint));
            }
            other => {
                return Err(Error::Protocol(format!(
                    "{endpoint}: expected status greeting, got {other:?}"
                )));
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let receiver = tokio::spawn(Self::receiver_loop(
            lines,
            Arc::clone(&buffer),
            Arc::clone(&alive),
            endpoint.clone(),
        ));

        debug!("Connected to bridge at {}", endpoint);
        Ok(Self {
            endpoint,
            alive,
            buffer,
            writer: Arc::new(Mutex::new(write_half)),
            receiver,
        })
    }

    async fn receiver_loop(
        mut lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
        buffer: Arc<Mutex<Vec<String>>>,
        alive: Arc<AtomicBool>,
        endpoint: String,
    ) {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Bridge {} read error: {}", endpoint, e);
                    break;
                }
            };
            match WireMessage::decode(&line) {
                Ok(WireMessage::Output { data }) => {
                    let mut buf = buffer.lock().await;
                    buf.extend(data.lines().map(str::to_string));
                    if buf.len() > MAX_BUFFER_LINES {
                        let excess = buf.len() - MAX_BUFFER_LINES;
                        buf.drain(..excess);
                    }
                }
                Ok(WireMessage::Status { alive: false }) => {
                    debug!("Bridge {} reports agent exit", endpoint);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Bridge {} sent malformed line: {}", endpoint, e);
                }
            }
        }
        alive.store(false, Ordering::SeqCst);
    }

    /// Current rolling screen buffer.
    pub async fn capture(&self) -> Result<String> {
        let buf = self.buffer.lock().await;
        Ok(buf.join("\n"))
    }

    /// Send prompt text; the trailing newline submits it on the server side.
    pub async fn send(&self, text: &str) -> Result<()> {
        let mut payload = text.to_string();
        payload.push('\n');
        self.send_message(&WireMessage::Input { data: payload }).await
    }

    /// Deliver a control signal.
    pub async fn signal(&self, signal: ControlSignal) -> Result<()> {
        match signal {
            ControlSignal::Interrupt => {
                self.send_message(&WireMessage::Input {
                    data: protocol::INTERRUPT.to_string(),
                })
                .await
            }
        }
    }

    async fn send_message(&self, message: &WireMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::DeadSession(self.endpoint.clone()));
        }
        let line = message.encode()?;
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            self.alive.store(false, Ordering::SeqCst);
            return Err(Error::Transport(format!("{}: {e}", self.endpoint)));
        }
        writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("{}: {e}", self.endpoint)))
    }

    /// Whether the connection (and the agent behind it) is still up.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// The `host:port` this transport is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the receiver task and mark the transport dead.
    pub async fn disconnect(&self) {
        self.receiver.abort();
        self.alive.store(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
