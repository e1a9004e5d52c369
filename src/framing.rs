//! Splitting of inbound bytes into chat messages.

use crate::error::Error;
use std::str::FromStr;

/// How a peer's inbound byte stream is cut into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Buffer until a `\n` is seen. Each message keeps its terminator.
    #[default]
    Line,
    /// Every chunk returned by a socket read is one message.
    Raw,
}

impl FromStr for Framing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(Framing::Line),
            "raw" => Ok(Framing::Raw),
            _ => Err(Error::InvalidFraming {
                got: s.to_string(),
                valid: vec!["line".to_string(), "raw".to_string()],
            }),
        }
    }
}

/// Per-peer inbound buffer.
#[derive(Debug)]
pub struct LineBuffer {
    framing: Framing,
    max_len: usize,
    pending: Vec<u8>,
    // Set after an overlong line was flushed; the rest of that line is
    // dropped up to and including its terminator.
    discarding: bool,
}

impl LineBuffer {
    /// Creates an empty buffer. In [`Framing::Line`] mode a partial line is
    /// flushed as a message once it reaches `max_len` bytes, and whatever
    /// follows on that line is discarded.
    pub fn new(framing: Framing, max_len: usize) -> Self {
        Self {
            framing,
            max_len: max_len.max(1),
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Feeds one chunk of received bytes and returns every message it
    /// completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        if chunk.is_empty() {
            return Vec::new();
        }

        if self.framing == Framing::Raw {
            return vec![chunk.to_vec()];
        }

        let mut messages = Vec::new();
        for &byte in chunk {
            if self.discarding {
                self.discarding = byte != b'\n';
                continue;
            }
            self.pending.push(byte);
            if byte == b'\n' {
                messages.push(std::mem::take(&mut self.pending));
            } else if self.pending.len() >= self.max_len {
                messages.push(std::mem::take(&mut self.pending));
                self.discarding = true;
            }
        }
        messages
    }

    /// True while the tail of an overlong line is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Bytes received so far that do not yet form a complete message.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
