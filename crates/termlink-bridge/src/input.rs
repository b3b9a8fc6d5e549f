//! Attended-mode input: forward the operator's own keyboard into the PTY so
//! the local terminal stays usable while observers are connected.

use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, warn};

use termlink_core::Result;

use crate::server::BridgeServer;

/// Translate a key event into the byte sequence a terminal would send.
///
/// Returns `None` for keys with no byte representation (modifier-only events,
/// function keys the wrapped CLI doesn't use).
pub fn encode_key(event: &KeyEvent) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = match event.code {
        KeyCode::Char(c) => {
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                let upper = c.to_ascii_uppercase();
                if upper.is_ascii_uppercase() {
                    vec![upper as u8 - b'A' + 1]
                } else {
                    return None;
                }
            } else {
                c.to_string().into_bytes()
            }
        }
        KeyCode::Enter => b"\r".to_vec(),
        KeyCode::Backspace => b"\x7f".to_vec(),
        KeyCode::Tab => b"\t".to_vec(),
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => b"\x1b".to_vec(),
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        _ => return None,
    };
    Some(bytes)
}

/// Run the local keyboard pump on a blocking thread.
///
/// Puts the operator's terminal into raw mode for the lifetime of the pump;
/// key events go straight into the PTY and terminal resizes propagate to the
/// PTY and the emulator. Returns once the PTY is gone.
pub fn run_stdin_pump(server: Arc<BridgeServer>) -> Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    let result = pump_events(&server);
    if let Err(e) = crossterm::terminal::disable_raw_mode() {
        warn!("Failed to restore terminal mode: {}", e);
    }
    result
}

fn pump_events(server: &BridgeServer) -> Result<()> {
    loop {
        if !server.pty().is_alive() {
            return Ok(());
        }
        // Poll with a timeout so agent exit is noticed without a keypress
        if !crossterm::event::poll(std::time::Duration::from_millis(200))? {
            continue;
        }
        let event = crossterm::event::read()?;
        match event {
            Event::Key(key) => {
                if let Some(bytes) = encode_key(&key) {
                    if server.pty().write(&bytes).is_err() {
                        return Ok(());
                    }
                }
            }
            Event::Resize(cols, rows) => {
                debug!("Local terminal resized to {}x{}", cols, rows);
                let _ = server.resize(rows, cols);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        }
    }

    #[test]
    fn test_plain_char() {
        assert_eq!(encode_key(&key(KeyCode::Char('a'), KeyModifiers::NONE)), Some(b"a".to_vec()));
    }

    #[test]
    fn test_ctrl_c() {
        assert_eq!(
            encode_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(vec![0x03])
        );
    }

    #[test]
    fn test_arrows_and_navigation() {
        assert_eq!(encode_key(&key(KeyCode::Up, KeyModifiers::NONE)), Some(b"\x1b[A".to_vec()));
        assert_eq!(encode_key(&key(KeyCode::Down, KeyModifiers::NONE)), Some(b"\x1b[B".to_vec()));
        assert_eq!(encode_key(&key(KeyCode::Home, KeyModifiers::NONE)), Some(b"\x1b[H".to_vec()));
        assert_eq!(
            encode_key(&key(KeyCode::Delete, KeyModifiers::NONE)),
            Some(b"\x1b[3~".to_vec())
        );
        assert_eq!(
            encode_key(&key(KeyCode::PageDown, KeyModifiers::NONE)),
            Some(b"\x1b[6~".to_vec())
        );
    }

    #[test]
    fn test_enter_and_escape() {
        assert_eq!(encode_key(&key(KeyCode::Enter, KeyModifiers::NONE)), Some(b"\r".to_vec()));
        assert_eq!(encode_key(&key(KeyCode::Esc, KeyModifiers::NONE)), Some(b"\x1b".to_vec()));
    }

    #[test]
    fn test_unmapped_key() {
        assert_eq!(encode_key(&key(KeyCode::F(5), KeyModifiers::NONE)), None);
    }
}
