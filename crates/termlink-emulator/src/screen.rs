//! Text-only terminal screen driven by the VTE parser.

use vte::{Params, Perform};

/// Character grid with cursor state.
///
/// Implements [`vte::Perform`], handling the subset of control functions an
/// interactive CLI actually exercises: printing with wrap, scrolling on line
/// feed at the bottom row, cursor movement, and erase operations. Colors and
/// text attributes are consumed and dropped.
#[derive(Debug)]
pub struct Screen {
    cells: Vec<char>,
    rows: u16,
    cols: u16,
    cursor_row: u16,
    cursor_col: u16,
}

impl Screen {
    /// Create a blank screen.
    pub fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            cells: vec![' '; rows as usize * cols as usize],
            rows,
            cols,
            cursor_row: 0,
            cursor_col: 0,
        }
    }

    /// Screen rows.
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Screen columns.
    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Current cursor position (row, col).
    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_row, self.cursor_col)
    }

    fn idx(&self, row: u16, col: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    /// Render the visible grid: rows joined by newlines, each right-trimmed,
    /// trailing blank rows removed.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = (0..self.rows)
            .map(|row| {
                let start = self.idx(row, 0);
                let end = start + self.cols as usize;
                self.cells[start..end]
                    .iter()
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    /// Resize the grid, preserving content from the top-left corner.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let mut cells = vec![' '; rows as usize * cols as usize];
        for row in 0..self.rows.min(rows) {
            for col in 0..self.cols.min(cols) {
                cells[row as usize * cols as usize + col as usize] =
                    self.cells[self.idx(row, col)];
            }
        }
        self.cells = cells;
        self.rows = rows;
        self.cols = cols;
        self.cursor_row = self.cursor_row.min(rows - 1);
        self.cursor_col = self.cursor_col.min(cols - 1);
    }

    fn scroll_up(&mut self) {
        self.cells.copy_within(self.cols as usize.., 0);
        let tail = self.cells.len() - self.cols as usize;
        self.cells[tail..].fill(' ');
    }

    fn linefeed(&mut self) {
        if self.cursor_row + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor_row += 1;
        }
    }

    fn clear_range(&mut self, start: usize, end: usize) {
        self.cells[start..end].fill(' ');
    }

    fn erase_in_display(&mut self, mode: u16) {
        let cursor = self.idx(self.cursor_row, self.cursor_col);
        match mode {
            0 => self.clear_range(cursor, self.cells.len()),
            1 => self.clear_range(0, (cursor + 1).min(self.cells.len())),
            2 | 3 => {
                self.cells.fill(' ');
                self.cursor_row = 0;
                self.cursor_col = 0;
            }
            _ => {}
        }
    }

    fn erase_in_line(&mut self, mode: u16) {
        let line_start = self.idx(self.cursor_row, 0);
        let line_end = line_start + self.cols as usize;
        let cursor = self.idx(self.cursor_row, self.cursor_col);
        match mode {
            0 => self.clear_range(cursor, line_end),
            1 => self.clear_range(line_start, (cursor + 1).min(line_end)),
            2 => self.clear_range(line_start, line_end),
            _ => {}
        }
    }
}

fn first_param(params: &Params, default: u16) -> u16 {
    params
        .iter()
        .next()
        .map(|p| p[0])
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        if self.cursor_col >= self.cols {
            self.cursor_col = 0;
            self.linefeed();
        }
        let idx = self.idx(self.cursor_row, self.cursor_col);
        self.cells[idx] = c;
        self.cursor_col += 1;
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            // Backspace
            0x08 => self.cursor_col = self.cursor_col.saturating_sub(1),
            // Horizontal tab: next multiple-of-8 stop
            0x09 => {
                let next = ((self.cursor_col / 8) + 1) * 8;
                self.cursor_col = next.min(self.cols - 1);
            }
            // Line feed
            0x0a => self.linefeed(),
            // Carriage return
            0x0d => self.cursor_col = 0,
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _c: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, c: char) {
        match c {
            // Cursor up/down/forward/backward
            'A' => {
                self.cursor_row = self.cursor_row.saturating_sub(first_param(params, 1));
            }
            'B' => {
                self.cursor_row =
                    (self.cursor_row + first_param(params, 1)).min(self.rows - 1);
            }
            'C' => {
                self.cursor_col =
                    (self.cursor_col + first_param(params, 1)).min(self.cols - 1);
            }
            'D' => {
                self.cursor_col = self.cursor_col.saturating_sub(first_param(params, 1));
            }
            // Cursor position
            'H' | 'f' => {
                let mut iter = params.iter();
                let row = iter.next().map(|p| p[0]).unwrap_or(1).max(1) - 1;
                let col = iter.next().map(|p| p[0]).unwrap_or(1).max(1) - 1;
                self.cursor_row = row.min(self.rows - 1);
                self.cursor_col = col.min(self.cols - 1);
            }
            // Erase in display / line
            'J' => {
                let mode = params.iter().next().map(|p| p[0]).unwrap_or(0);
                self.erase_in_display(mode);
            }
            'K' => {
                let mode = params.iter().next().map(|p| p[0]).unwrap_or(0);
                self.erase_in_line(mode);
            }
            // SGR and everything else: no visual state to track
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

/// VTE state machine plus the screen it drives.
///
/// The parser is persistent so escape sequences split across PTY read chunks
/// are reassembled correctly.
pub struct Emulator {
    parser: vte::Parser,
    screen: Screen,
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("screen", &self.screen)
            .finish_non_exhaustive()
    }
}

impl Emulator {
    /// Create an emulator with a blank screen.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: vte::Parser::new(),
            screen: Screen::new(rows, cols),
        }
    }

    /// Feed raw PTY bytes through the parser into the screen.
    pub fn feed(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.parser.advance(&mut self.screen, *byte);
        }
    }

    /// Render the current screen.
    pub fn render(&self) -> String {
        self.screen.render()
    }

    /// Resize the underlying screen.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.screen.resize(rows, cols);
    }

    /// Access the underlying screen.
    pub fn screen(&self) -> &Screen {
        &self.screen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let mut emu = Emulator::new(24, 80);
        emu.feed(b"A\r\nB\r\n");
        assert_eq!(emu.render(), "A\nB");
    }

    #[test]
    fn test_render_trims_trailing_blanks() {
        let mut emu = Emulator::new(24, 80);
        emu.feed(b"hello   \r\n\r\n\r\n");
        assert_eq!(emu.render(), "hello");
    }

    #[test]
    fn test_carriage_return_overwrites() {
        let mut emu = Emulator::new(24, 80);
        emu.feed(b"12345\rab");
        assert_eq!(emu.render(), "ab345");
    }

    #[test]
    fn test_scroll_at_bottom() {
        let mut emu = Emulator::new(2, 10);
        emu.feed(b"1\r\n2\r\n3");
        assert_eq!(emu.render(), "2\n3");
    }

    #[test]
    fn test_wrap_at_right_edge() {
        let mut emu = Emulator::new(4, 5);
        emu.feed(b"abcdefg");
        assert_eq!(emu.render(), "abcde\nfg");
    }

    #[test]
    fn test_sgr_ignored() {
        let mut emu = Emulator::new(24, 80);
        emu.feed(b"\x1b[1;32mgreen\x1b[0m plain");
        assert_eq!(emu.render(), "green plain");
    }

    #[test]
    fn test_cursor_position_and_erase() {
        let mut emu = Emulator::new(5, 20);
        emu.feed(b"first\r\nsecond\r\nthird");
        // Home, clear to end, rewrite
        emu.feed(b"\x1b[H\x1b[Jfresh");
        assert_eq!(emu.render(), "fresh");
    }

    #[test]
    fn test_cursor_addressing() {
        let mut emu = Emulator::new(5, 20);
        emu.feed(b"\x1b[2;3HX");
        assert_eq!(emu.render(), "\n  X");
    }

    #[test]
    fn test_erase_in_line() {
        let mut emu = Emulator::new(3, 20);
        emu.feed(b"hello world\x1b[6D\x1b[K");
        assert_eq!(emu.render(), "hello");
    }

    #[test]
    fn test_split_escape_sequence_across_feeds() {
        let mut emu = Emulator::new(5, 20);
        emu.feed(b"\x1b[");
        emu.feed(b"2;2H");
        emu.feed(b"ok");
        assert_eq!(emu.render(), "\n ok");
    }

    #[test]
    fn test_resize_preserves_content() {
        let mut emu = Emulator::new(4, 10);
        emu.feed(b"keep");
        emu.resize(8, 20);
        assert_eq!(emu.render(), "keep");
        assert_eq!(emu.screen().rows(), 8);
        assert_eq!(emu.screen().cols(), 20);
    }

    #[test]
    fn test_tab_stops() {
        let mut emu = Emulator::new(2, 20);
        emu.feed(b"a\tb");
        assert_eq!(emu.render(), "a       b");
    }
}
