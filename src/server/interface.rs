use crate::error::Error;
use mio::Waker;
use std::sync::{mpsc::Sender, Arc};

// Internal request type for cross-thread communication
#[derive(Debug)]
pub(crate) enum ServerRequest {
    /// Send bytes to every connected peer.
    Announce { data: Vec<u8> },
    /// Close all peers and the listener, then return from `run()`.
    Shutdown,
}

/// Thread-safe handle to a running [`ChatServer`](super::ChatServer).
///
/// Obtain one with
/// [`ChatServer::interface()`](super::ChatServer::interface) before moving the
/// server onto its own thread. Requests are queued and picked up by the event
/// loop on its next wakeup, so the registry keeps a single mutator.
#[derive(Debug, Clone)]
pub struct ServerInterface {
    pub(crate) sender: Sender<ServerRequest>,
    pub(crate) waker: Arc<Waker>,
}

impl ServerInterface {
    /// Queues `data` to be broadcast to every connected peer.
    pub fn announce(&self, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.request(ServerRequest::Announce { data: data.into() })
    }

    /// Asks the event loop to close every connection and return.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.request(ServerRequest::Shutdown)
    }

    fn request(&self, request: ServerRequest) -> Result<(), Error> {
        self.sender
            .send(request)
            .map_err(|_| Error::ServerStopped)?;
        self.waker.wake()?;
        Ok(())
    }
}
