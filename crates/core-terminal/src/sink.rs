//! Ordered terminal command queue, the single write path for a frame.
//!
//! Design invariants:
//! * Commands preserve ordering; nothing is flushed mid-frame. One
//!   `flush_into` call produces one buffered write burst.
//! * All positions are absolute within the display region, (0,0) origin;
//!   the caller ensures bounds.
//! * Consecutive `Print` pushes are merged into one command so a repainted
//!   row costs one terminal write, not one per cell run.
//! * The sink owns no device handle; tests flush into a byte buffer, the
//!   coordinator flushes into stdout.

use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::Write;

use crate::TerminalError;

#[derive(Debug)]
pub enum SinkCommand {
    MoveTo(u16, u16),
    /// Clear the full line under the cursor before a whole-row repaint.
    ClearLine,
    /// Clear from the cursor to the end of the display; used when the new
    /// frame occupies fewer rows than the previous one.
    ClearBelow,
    Print(String),
}

#[derive(Default)]
pub struct CommandSink {
    cmds: Vec<SinkCommand>,
    pub print_commands: u64,
    pub cells_printed: u64,
}

impl CommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn move_to(&mut self, x: u16, y: u16) {
        self.cmds.push(SinkCommand::MoveTo(x, y));
    }

    pub fn clear_line(&mut self) {
        self.cmds.push(SinkCommand::ClearLine);
    }

    pub fn clear_below(&mut self) {
        self.cmds.push(SinkCommand::ClearBelow);
    }

    /// Queue printable text. `cells` is the visual width the text occupies,
    /// tracked for diff-minimality instrumentation.
    pub fn print<S: Into<String>>(&mut self, s: S, cells: u64) {
        let s: String = s.into();
        if s.is_empty() {
            return;
        }
        self.cells_printed += cells;
        if let Some(SinkCommand::Print(prev)) = self.cmds.last_mut() {
            prev.push_str(&s);
            return;
        }
        self.cmds.push(SinkCommand::Print(s));
        self.print_commands += 1;
    }

    /// Translate queued commands into terminal control sequences and flush
    /// them as one write burst. Consumes the sink; a sink is per-frame.
    pub fn flush_into<W: Write>(self, out: &mut W) -> Result<(), TerminalError> {
        for c in self.cmds {
            match c {
                SinkCommand::MoveTo(x, y) => queue!(out, MoveTo(x, y))?,
                SinkCommand::ClearLine => queue!(out, Clear(ClearType::CurrentLine))?,
                SinkCommand::ClearBelow => queue!(out, Clear(ClearType::FromCursorDown))?,
                SinkCommand::Print(s) => queue!(out, Print(s))?,
            }
        }
        out.flush()?;
        Ok(())
    }
}
