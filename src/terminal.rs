//! Line editing for the interactive client.
//!
//! With the terminal in raw mode nothing is echoed or edited by the terminal
//! itself. [`TerminalInput`] does the editing and hands out finished lines,
//! keeping the line being typed in a [`SharedLine`]. [`TerminalOutput`] hides
//! that line while other text is printed and draws it again afterwards, so
//! incoming chat never lands in the middle of what the user is typing.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// Moves to column 0 and erases the row.
const CLEAR_LINE: &[u8] = b"\r\x1b[2K";
const RUB_OUT: &[u8] = b"\x08 \x08";

/// The line currently being typed, shared by input and output.
#[derive(Debug, Clone, Default)]
pub struct SharedLine(Arc<Mutex<Vec<u8>>>);

impl SharedLine {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Start,
    Sequence,
}

/// Reads keystrokes from a raw-mode terminal and yields `\n`-terminated
/// lines.
///
/// Enter submits the line, backspace removes the last character, escape
/// sequences (arrow keys and the like) are ignored. Ctrl-C, or Ctrl-D on an
/// empty line, ends the input.
#[derive(Debug)]
pub struct TerminalInput<R, E> {
    inner: R,
    echo: E,
    line: SharedLine,
    ready: Vec<u8>,
    escape: Escape,
    after_cr: bool,
    eof: bool,
}

impl<R: Read, E: Write> TerminalInput<R, E> {
    /// Reads keys from `inner` and echoes the edits to `echo`.
    pub fn new(inner: R, echo: E, line: SharedLine) -> Self {
        Self {
            inner,
            echo,
            line,
            ready: Vec::new(),
            escape: Escape::None,
            after_cr: false,
            eof: false,
        }
    }

    /// Applies typed bytes to the line being edited.
    pub fn feed(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut line = self.line.lock();

        for &byte in bytes {
            if self.eof {
                break;
            }

            match self.escape {
                Escape::Start => {
                    self.escape = match byte {
                        b'[' | b'O' => Escape::Sequence,
                        _ => Escape::None,
                    };
                    continue;
                }
                Escape::Sequence => {
                    if (0x40..=0x7e).contains(&byte) {
                        self.escape = Escape::None;
                    }
                    continue;
                }
                Escape::None => {}
            }

            let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');
            match byte {
                // A pasted "\r\n" is one line.
                b'\n' if after_cr => {}
                b'\r' | b'\n' => {
                    self.echo.write_all(CLEAR_LINE)?;
                    self.ready.append(&mut line);
                    self.ready.push(b'\n');
                }
                CTRL_C => self.eof = true,
                CTRL_D if line.is_empty() => self.eof = true,
                BACKSPACE | DEL => {
                    if pop_char(&mut line) {
                        self.echo.write_all(RUB_OUT)?;
                    }
                }
                ESC => self.escape = Escape::Start,
                0x20..=0xff => {
                    line.push(byte);
                    self.echo.write_all(&[byte])?;
                }
                _ => {}
            }
        }

        self.echo.flush()
    }

    /// True once the user asked to end the input.
    pub fn is_closed(&self) -> bool {
        self.eof
    }
}

// Removes the last UTF-8 character. Returns false on an empty line.
fn pop_char(line: &mut Vec<u8>) -> bool {
    let Some(mut byte) = line.pop() else {
        return false;
    };
    while byte & 0xc0 == 0x80 {
        match line.pop() {
            Some(prev) => byte = prev,
            None => break,
        }
    }
    true
}

impl<R: Read, E: Write> Read for TerminalInput<R, E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut keys = [0u8; 64];
        while self.ready.is_empty() && !self.eof {
            match self.inner.read(&mut keys)? {
                0 => self.eof = true,
                n => self.feed(&keys[..n])?,
            }
        }

        let n = buf.len().min(self.ready.len());
        buf[..n].copy_from_slice(&self.ready[..n]);
        self.ready.drain(..n);
        Ok(n)
    }
}

/// Writes to a raw-mode terminal around the line being typed.
///
/// `\n` is written as `\r\n`, since raw mode turns off that translation.
#[derive(Debug)]
pub struct TerminalOutput<W> {
    inner: W,
    line: SharedLine,
}

impl<W: Write> TerminalOutput<W> {
    pub fn new(inner: W, line: SharedLine) -> Self {
        Self { inner, line }
    }
}

impl<W: Write> Write for TerminalOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = self.line.lock();

        if !line.is_empty() {
            self.inner.write_all(CLEAR_LINE)?;
        }
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(text) => {
                    self.inner.write_all(text)?;
                    self.inner.write_all(b"\r\n")?;
                }
                None => self.inner.write_all(chunk)?,
            }
        }
        if !line.is_empty() {
            self.inner.write_all(&line)?;
        }

        self.inner.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Puts stdin into raw mode and restores the saved settings on drop.
#[cfg(unix)]
pub struct TerminalGuard {
    original: Option<nix::sys::termios::Termios>,
}

#[cfg(unix)]
impl TerminalGuard {
    /// Switches to raw mode. Does nothing when stdin is not a terminal.
    pub fn enter_raw_mode() -> Self {
        use nix::sys::termios;

        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin).ok();
        if let Some(ref original) = original {
            let mut raw = original.clone();
            termios::cfmakeraw(&mut raw);
            if let Err(err) = termios::tcsetattr(&stdin, termios::SetArg::TCSANOW, &raw) {
                tracing::warn!(?err, "Failed to enter raw mode");
            }
        }
        Self { original }
    }
}

#[cfg(unix)]
impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(ref original) = self.original {
            use nix::sys::termios;
            let stdin = io::stdin();
            let _ = termios::tcsetattr(&stdin, termios::SetArg::TCSANOW, original);
        }
    }
}
