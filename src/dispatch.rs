//! Classification of inbound lines into commands and chat messages.
//!
//! A line starting with `/` is a command of the form `/<name>[ <argument>]`.
//! Everything else is chat and gets relayed to the other peers as
//! `<nick>> <line>`.

use crate::broadcast::{broadcast, send_to_peer};
use crate::registry::{ClientRegistry, Handle};
use std::io::Write;
use tracing::{info, warn};

pub const COMMAND_PREFIX: u8 = b'/';

/// Sent to every peer right after admission.
pub const WELCOME_MSG: &[u8] = b"Welcome to Simple Chat! Use /nick <nick> to set your nick.\n";

/// Sent to a peer whose command was not understood.
pub const UNSUPPORTED_COMMAND_MSG: &[u8] = b"Unsupported command\n";

/// A parsed inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    /// `/<name>[ <arg>]` with the line terminator stripped. `arg` is `None`
    /// when there is no space after the name.
    Command {
        name: &'a [u8],
        arg: Option<&'a [u8]>,
    },
    /// Anything not starting with the command prefix, untouched.
    Chat(&'a [u8]),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a [u8]) -> Self {
        if line.first() != Some(&COMMAND_PREFIX) {
            return Input::Chat(line);
        }

        let body = strip_line_end(&line[1..]);
        match body.iter().position(|&b| b == b' ') {
            Some(space) => Input::Command {
                name: &body[..space],
                arg: Some(&body[space + 1..]),
            },
            None => Input::Command {
                name: body,
                arg: None,
            },
        }
    }
}

// Cuts at the first '\r', then at the first '\n'.
fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = match line.iter().position(|&b| b == b'\r') {
        Some(pos) => &line[..pos],
        None => line,
    };
    match line.iter().position(|&b| b == b'\n') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Commands the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/nick <name>` with a non-empty name, kept byte for byte.
    Nick(Vec<u8>),
    Unsupported,
}

impl Command {
    pub fn from_parts(name: &[u8], arg: Option<&[u8]>) -> Self {
        match (name, arg) {
            (b"nick", Some(arg)) if !arg.is_empty() => {
                Command::Nick(arg.to_vec())
            }
            _ => Command::Unsupported,
        }
    }
}

/// What a dispatched line did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sender's display name was replaced.
    NickChanged { old: Vec<u8>, new: Vec<u8> },
    /// The sender was told its command is unsupported.
    Rejected,
    /// A chat line went out to `delivered` other peers.
    Broadcast { delivered: usize },
    /// The sender is not (or no longer) registered.
    Ignored,
}

/// Builds `<nick>> <msg>`, cut to `max_line_len - 1` bytes if it would not
/// fit in `max_line_len`.
pub fn format_chat_line(nick: &[u8], msg: &[u8], max_line_len: usize) -> Vec<u8> {
    let mut line = Vec::with_capacity(nick.len() + 2 + msg.len());
    line.extend_from_slice(nick);
    line.extend_from_slice(b"> ");
    line.extend_from_slice(msg);
    if line.len() >= max_line_len {
        line.truncate(max_line_len.saturating_sub(1));
    }
    line
}

/// Routes lines from peers to commands or broadcast.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    max_line_len: usize,
}

impl Dispatcher {
    pub fn new(max_line_len: usize) -> Self {
        Self { max_line_len }
    }

    /// Handles one complete message received from `from`.
    pub fn dispatch<C: Write>(
        &self,
        registry: &mut ClientRegistry<C>,
        from: Handle,
        msg: &[u8],
    ) -> Outcome {
        let Some(peer) = registry.get_mut(from) else {
            warn!(id = from, "Message from unknown peer");
            return Outcome::Ignored;
        };

        match Input::parse(msg) {
            Input::Command { name, arg } => match Command::from_parts(name, arg) {
                Command::Nick(new) => {
                    let old = peer.set_nick(new.clone());
                    info!(
                        id = from,
                        old = %String::from_utf8_lossy(&old),
                        new = %String::from_utf8_lossy(&new),
                        "Nick changed"
                    );
                    Outcome::NickChanged { old, new }
                }
                Command::Unsupported => {
                    info!(
                        id = from,
                        command = %String::from_utf8_lossy(name),
                        "Unsupported command"
                    );
                    send_to_peer(peer.conn_mut(), from, UNSUPPORTED_COMMAND_MSG);
                    Outcome::Rejected
                }
            },
            Input::Chat(text) => {
                let line = format_chat_line(peer.nick(), text, self.max_line_len);
                info!("{}", String::from_utf8_lossy(&line).trim_end());
                let delivered = broadcast(registry, Some(from), &line);
                Outcome::Broadcast { delivered }
            }
        }
    }
}
