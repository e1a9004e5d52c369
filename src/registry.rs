//! Registry of connected peers.
//!
//! Peers live in a fixed number of slots addressed directly by their handle.
//! Handles are handed out lowest-free-first, the same way an operating system
//! issues descriptors, so slots stay dense and a handle is only reused after
//! its peer has been evicted. Iteration is in ascending handle order and never
//! scans beyond the high-water mark.

use crate::error::Error;
use crate::framing::{Framing, LineBuffer};
use std::borrow::Cow;
use tracing::{debug, trace};

/// Identifies a connected peer. Also used as the peer's poll token.
pub type Handle = usize;

/// A connected client and its server-side state.
#[derive(Debug)]
pub struct Peer<C> {
    handle: Handle,
    nick: Vec<u8>,
    conn: C,
    inbound: LineBuffer,
}

impl<C> Peer<C> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The display name prefixed to this peer's chat messages, as the peer
    /// sent it.
    pub fn nick(&self) -> &[u8] {
        &self.nick
    }

    /// The display name for logs.
    pub fn display_nick(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.nick)
    }

    /// Replaces the display name, returning the previous one.
    pub fn set_nick(&mut self, nick: impl Into<Vec<u8>>) -> Vec<u8> {
        std::mem::replace(&mut self.nick, nick.into())
    }

    pub fn conn(&self) -> &C {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn inbound_mut(&mut self) -> &mut LineBuffer {
        &mut self.inbound
    }

    /// Consumes the peer and hands back its connection.
    pub fn into_conn(self) -> C {
        self.conn
    }
}

/// Default display name for a freshly admitted peer.
pub fn default_nick(handle: Handle) -> Vec<u8> {
    format!("user:{handle}").into_bytes()
}

/// The authoritative set of live peers.
#[derive(Debug)]
pub struct ClientRegistry<C> {
    slots: Vec<Option<Peer<C>>>,
    len: usize,
    high_water_mark: Option<Handle>,
    framing: Framing,
    max_line_len: usize,
}

impl<C> ClientRegistry<C> {
    /// Creates an empty registry with `capacity` slots, using line framing.
    pub fn new(capacity: usize) -> Self {
        Self::with_framing(capacity, Framing::Line, crate::config::DEFAULT_MAX_LINE_LEN)
    }

    /// Creates an empty registry whose peers frame inbound bytes with
    /// `framing`.
    pub fn with_framing(capacity: usize, framing: Framing, max_line_len: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            len: 0,
            high_water_mark: None,
            framing,
            max_line_len,
        }
    }

    /// Admits a new peer under `handle`.
    ///
    /// Fails if `handle` is out of range or its slot is still occupied.
    pub fn admit(&mut self, handle: Handle, conn: C) -> Result<&mut Peer<C>, Error> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(handle)
            .ok_or(Error::HandleOutOfRange { handle, capacity })?;
        if slot.is_some() {
            return Err(Error::SlotOccupied { handle });
        }

        if self.high_water_mark.map_or(true, |mark| handle > mark) {
            self.high_water_mark = Some(handle);
        }
        self.len += 1;
        debug!(id = handle, live = self.len, "Admitted peer");

        Ok(slot.insert(Peer {
            handle,
            nick: default_nick(handle),
            conn,
            inbound: LineBuffer::new(self.framing, self.max_line_len),
        }))
    }

    /// Removes the peer under `handle` and returns it. Dropping the returned
    /// peer closes its connection.
    pub fn evict(&mut self, handle: Handle) -> Option<Peer<C>> {
        let peer = self.slots.get_mut(handle)?.take()?;
        self.len -= 1;

        if self.high_water_mark == Some(handle) {
            // Only runs when the numerically largest peer leaves.
            self.high_water_mark = (0..handle).rev().find(|&h| self.slots[h].is_some());
            trace!(mark = ?self.high_water_mark, "Recomputed high-water mark");
        }
        debug!(id = handle, live = self.len, "Evicted peer");

        Some(peer)
    }

    /// Lowest handle whose slot is free, if any.
    pub fn next_free_handle(&self) -> Option<Handle> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        matches!(self.slots.get(handle), Some(Some(_)))
    }

    pub fn get(&self, handle: Handle) -> Option<&Peer<C>> {
        self.slots.get(handle)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Peer<C>> {
        self.slots.get_mut(handle)?.as_mut()
    }

    /// Number of live peers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Largest occupied handle, or `None` when no peer is connected.
    pub fn high_water_mark(&self) -> Option<Handle> {
        self.high_water_mark
    }

    fn occupied(&self) -> &[Option<Peer<C>>] {
        match self.high_water_mark {
            Some(mark) => &self.slots[..=mark],
            None => &[],
        }
    }

    /// Live peers in ascending handle order, skipping `excluded`.
    pub fn iter_except(&self, excluded: Option<Handle>) -> impl Iterator<Item = &Peer<C>> + '_ {
        self.occupied()
            .iter()
            .flatten()
            .filter(move |peer| Some(peer.handle) != excluded)
    }

    /// Mutable variant of [`Self::iter_except`].
    pub fn iter_except_mut(
        &mut self,
        excluded: Option<Handle>,
    ) -> impl Iterator<Item = &mut Peer<C>> + '_ {
        let end = self.high_water_mark.map_or(0, |mark| mark + 1);
        self.slots[..end]
            .iter_mut()
            .flatten()
            .filter(move |peer| Some(peer.handle) != excluded)
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.iter_except(None).map(Peer::handle).collect()
    }

    /// Evicts every peer, returning them in ascending handle order.
    pub fn drain(&mut self) -> Vec<Peer<C>> {
        let handles = self.handles();
        handles.into_iter().filter_map(|h| self.evict(h)).collect()
    }
}
