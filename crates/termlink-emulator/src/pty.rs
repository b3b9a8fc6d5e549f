//! PTY (pseudo-terminal) handling with portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use termlink_core::{Error, Result};

/// Handle to a spawned PTY process.
pub struct PtyHandle {
    /// The master PTY end
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    /// The child process
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    /// PTY writer
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    /// PTY reader - kept as field to maintain the non-blocking FD
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle").finish_non_exhaustive()
    }
}

impl PtyHandle {
    /// Spawn a new PTY running `command` with the given size.
    pub fn spawn(
        command: &str,
        args: &[String],
        rows: u16,
        cols: u16,
        cwd: Option<String>,
    ) -> Result<Self> {
        info!(
            "Spawning PTY: command='{}' args={:?}, size={}x{}, cwd={:?}",
            command, args, cols, rows, cwd
        );

        let pty_system = native_pty_system();
        let pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::Pty(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn command '{}': {}", command, e);
            Error::Pty(format!("Failed to spawn command: {e}"))
        })?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Pty(format!("Failed to take writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Pty(format!("Failed to clone reader: {e}")))?;

        // Non-blocking reads keep the read poll loop from wedging
        #[cfg(unix)]
        {
            if let Some(master_fd) = pair.master.as_raw_fd() {
                unsafe {
                    let flags = libc::fcntl(master_fd, libc::F_GETFL, 0);
                    if flags != -1
                        && libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1
                    {
                        error!("Failed to set master PTY to non-blocking mode");
                    }
                }
            }
        }

        info!("PTY spawned successfully: command='{}'", command);

        Ok(Self {
            master: Arc::new(Mutex::new(pair.master)),
            child: Arc::new(Mutex::new(child)),
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    /// Read available output from the PTY (non-blocking).
    ///
    /// Returns an empty vec when no data is available.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|e| Error::Pty(format!("Reader lock error: {e}")))?;

        let mut buffer = vec![0u8; 4096];
        match reader.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                if n > 0 {
                    debug!("Read {} bytes from PTY", n);
                }
                Ok(buffer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write data to the PTY.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to PTY", data.len());
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| Error::Pty(format!("Writer lock error: {e}")))?;
        writer.write_all(data).map_err(Error::Io)?;
        writer.flush().map_err(Error::Io)?;
        Ok(data.len())
    }

    /// Resize the PTY, notifying the child via SIGWINCH.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        info!("Resizing PTY to {}x{}", cols, rows);
        let master = self
            .master
            .lock()
            .map_err(|e| Error::Pty(format!("Master lock error: {e}")))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Pty(format!("Resize failed: {e}")))
    }

    /// Check if the child process is still running.
    pub fn is_alive(&self) -> bool {
        let mut child = match self.child.lock() {
            Ok(c) => c,
            Err(_) => return false,
        };
        child.try_wait().ok().flatten().is_none()
    }

    /// Kill the child process.
    pub fn kill(&self) -> Result<()> {
        info!("Killing PTY process");
        let mut child = self
            .child
            .lock()
            .map_err(|e| Error::Pty(format!("Child lock error: {e}")))?;
        child
            .kill()
            .map_err(|e| Error::Pty(format!("Kill failed: {e}")))
    }
}
