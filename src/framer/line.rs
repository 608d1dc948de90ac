//! Byte-to-line assembly.
//!
//! The modem terminates every line with `\r\n`. A single `>` at the start of
//! a line is the raw-data prompt and arrives without a terminator, so it is
//! emitted as soon as it is seen.
//!
//! Lines are kept as bytes: a publish notification carries its payload
//! verbatim, and that payload need not be text.

use heapless::Vec;

use crate::config::LINE_CAPACITY;
use crate::error::ProtocolError;

/// A completed line, terminator stripped.
pub type Line = Vec<u8, LINE_CAPACITY>;

/// The raw-data prompt byte.
pub const PROMPT: u8 = b'>';

/// Terminator recognition sub-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrState {
    /// Last byte was not `\r`.
    Idle,
    /// Last byte was `\r`; a following `\n` ends the line.
    SawCr,
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// A complete line (or the `>` prompt).
    Line(Line),
    /// A line ended but was rejected.
    Rejected(ProtocolError),
}

/// Fixed-capacity line assembler.
///
/// Bytes beyond [`LINE_CAPACITY`] are dropped and counted. When the
/// terminator of such a line arrives the whole line is rejected with
/// [`ProtocolError::LineOverflow`] instead of being dispatched truncated.
pub struct LineAssembler {
    buf: Vec<u8, LINE_CAPACITY>,
    cr: CrState,
    dropped: usize,
}

impl LineAssembler {
    /// An empty assembler waiting for the first byte of a line.
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            cr: CrState::Idle,
            dropped: 0,
        }
    }

    /// Feed one byte. Returns `Some` when a line has been completed.
    pub fn push(&mut self, byte: u8) -> Option<Assembled> {
        match (byte, self.cr) {
            (b'\n', CrState::SawCr) => {
                self.cr = CrState::Idle;
                return self.complete();
            }
            (b'\r', _) => {
                self.cr = CrState::SawCr;
                return None;
            }
            (b'\n' | b'\0', _) => {
                self.cr = CrState::Idle;
                return None;
            }
            _ => self.cr = CrState::Idle,
        }

        if byte == PROMPT && self.buf.is_empty() {
            let mut line = Line::new();
            let _ = line.push(PROMPT);
            return Some(Assembled::Line(line));
        }

        if self.buf.push(byte).is_err() {
            self.dropped += 1;
        }
        None
    }

    /// Number of bytes buffered for the current line.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no byte of the current line is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current state of the terminator sub-machine.
    pub fn cr_state(&self) -> CrState {
        self.cr
    }

    /// Drop any partial line, e.g. after the modem was reset.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.cr = CrState::Idle;
        self.dropped = 0;
    }

    fn complete(&mut self) -> Option<Assembled> {
        let dropped = core::mem::take(&mut self.dropped);
        if dropped > 0 {
            self.buf.clear();
            return Some(Assembled::Rejected(ProtocolError::LineOverflow));
        }
        if self.buf.is_empty() {
            return None;
        }
        Some(Assembled::Line(core::mem::take(&mut self.buf)))
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}
