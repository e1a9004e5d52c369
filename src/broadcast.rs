use crate::registry::{ClientRegistry, Handle};
use std::io::{ErrorKind, Write};
use tracing::{debug, trace};

/// Writes `buf` once to every peer except `excluded`, in ascending handle
/// order, and returns how many peers were written to.
///
/// Best effort: there is no outbound buffering and no retry. A short write, a
/// full socket buffer or a write error is accepted silently; a broken
/// connection will show up on the peer's next read and be evicted there.
pub fn broadcast<C: Write>(
    registry: &mut ClientRegistry<C>,
    excluded: Option<Handle>,
    buf: &[u8],
) -> usize {
    let mut delivered = 0;
    for peer in registry.iter_except_mut(excluded) {
        let id = peer.handle();
        if send_to_peer(peer.conn_mut(), id, buf) {
            delivered += 1;
        }
    }
    trace!(len = buf.len(), delivered, ?excluded, "Broadcast");
    delivered
}

/// Single best-effort write to one connection. Returns false if nothing could
/// be written.
pub(crate) fn send_to_peer<C: Write>(conn: &mut C, id: Handle, buf: &[u8]) -> bool {
    loop {
        match conn.write(buf) {
            Ok(sz) if sz < buf.len() => {
                debug!(id, written = sz, len = buf.len(), "Short write, dropping remainder");
                return sz > 0;
            }
            Ok(_) => return true,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                debug!(id, len = buf.len(), "Socket buffer full, dropping message");
                return false;
            }
            Err(err) => {
                debug!(id, ?err, "Error writing to peer");
                return false;
            }
        }
    }
}
