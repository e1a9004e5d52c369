//! The chat server's event loop.
//!
//! A single thread waits on a [`mio::Poll`] for the listening socket and every
//! connected peer. Within one wakeup the listener is serviced first, then the
//! ready peers in ascending handle order. Inbound bytes are framed into lines
//! and handed to the [`Dispatcher`]; everything the server sends goes out as a
//! best-effort write without buffering.

mod interface;

pub use interface::ServerInterface;
use interface::ServerRequest;

use crate::broadcast::{broadcast, send_to_peer};
use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, WELCOME_MSG};
use crate::error::Error;
use crate::registry::{ClientRegistry, Handle};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc,
};
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

// Peer handles are registry slots and start at 0, so the fixed tokens sit at
// the top of the range.
const LISTENER_ID: usize = usize::MAX;
const WAKE_ID: usize = usize::MAX - 1;

/// Process-wide chat state: the listening socket, the peer registry and the
/// poll instance. Created once, then driven by [`ChatServer::run`].
#[derive(Debug)]
pub struct ChatServer {
    registry: ClientRegistry<TcpStream>,
    listener: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    poll_capacity: usize,
    poll_timeout: Duration,
    read_buf_size: usize,
    dispatcher: Dispatcher,
    // Set when accepting stopped on a persistent error (e.g. out of file
    // descriptors) with connections possibly still queued.
    accept_stalled: bool,
    waker: Arc<Waker>,
    sender: Sender<ServerRequest>,
    receiver: Receiver<ServerRequest>,
}

// ============================================================================
// Constructors
// ============================================================================

impl ChatServer {
    /// Binds the listening socket and prepares an empty registry.
    ///
    /// Failing to resolve or bind the address is fatal for the caller.
    pub fn new(config: &ServerConfig) -> Result<Self, Error> {
        config.validate()?;

        let addr = config
            .bind
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, Token(LISTENER_ID), Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), Token(WAKE_ID))?);
        let (sender, receiver) = channel();

        info!(%local_addr, max_clients = config.max_clients, "Listening for connections");

        Ok(Self {
            registry: ClientRegistry::with_framing(
                config.max_clients,
                config.framing,
                config.max_line_len,
            ),
            listener,
            local_addr,
            poll,
            poll_capacity: config.poll_capacity,
            poll_timeout: config.poll_timeout,
            read_buf_size: config.read_buf_size,
            dispatcher: Dispatcher::new(config.max_line_len),
            accept_stalled: false,
            waker,
            sender,
            receiver,
        })
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ChatServer {
    /// Address the listener is bound to (useful when binding to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &ClientRegistry<TcpStream> {
        &self.registry
    }

    /// Gets a thread-safe handle for stopping the server from another thread.
    pub fn interface(&self) -> ServerInterface {
        ServerInterface {
            sender: self.sender.clone(),
            waker: self.waker.clone(),
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

impl ChatServer {
    /// Runs the event loop until a shutdown is requested through a
    /// [`ServerInterface`].
    ///
    /// Only unrecoverable errors are returned. Peers that fail are evicted
    /// and the loop carries on.
    #[instrument(skip(self), fields(addr = %self.local_addr))]
    pub fn run(&mut self) -> Result<(), Error> {
        let mut events = Events::with_capacity(self.poll_capacity);

        loop {
            if let Err(err) = self.poll.poll(&mut events, Some(self.poll_timeout)) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(?err, "Waiting for readiness failed");
                return Err(Error::PollError(err.to_string()));
            }

            if events.is_empty() {
                trace!("Idle timeout");
                if self.accept_stalled {
                    self.accept_connections()?;
                }
                continue;
            }

            let mut listener_ready = false;
            let mut woken = false;
            let mut ready = Vec::new();
            for event in events.iter() {
                match event.token() {
                    Token(LISTENER_ID) => listener_ready = true,
                    Token(WAKE_ID) => woken = true,
                    Token(id) => ready.push(id),
                }
            }

            if woken && self.process_requests() {
                self.close_all();
                return Ok(());
            }

            if listener_ready || self.accept_stalled {
                self.accept_connections()?;
            }

            ready.sort_unstable();
            ready.dedup();
            for id in ready {
                self.service_peer(id);
            }
        }
    }

    // Returns true once a shutdown was requested.
    fn process_requests(&mut self) -> bool {
        let requests: Vec<ServerRequest> = self.receiver.try_iter().collect();
        let mut shutdown = false;

        for request in requests {
            match request {
                ServerRequest::Announce { data } => {
                    let delivered = broadcast(&mut self.registry, None, &data);
                    debug!(len = data.len(), delivered, "Announced");
                }
                ServerRequest::Shutdown => shutdown = true,
            }
        }

        shutdown
    }

    #[instrument(skip(self))]
    fn close_all(&mut self) {
        for peer in self.registry.drain() {
            let id = peer.handle();
            let mut stream = peer.into_conn();
            if let Err(err) = self.poll.registry().deregister(&mut stream) {
                warn!(id, ?err, "Failed to deregister connection");
            }
        }
        if let Err(err) = self.poll.registry().deregister(&mut self.listener) {
            warn!(?err, "Failed to deregister listener");
        }
        info!(addr = %self.local_addr, "Server shut down");
    }
}

// ============================================================================
// Internal Connection I/O
// ============================================================================

impl ChatServer {
    #[instrument(skip(self))]
    fn accept_connections(&mut self) -> Result<(), Error> {
        // The listener is edge-triggered, so keep accepting until it would
        // block. Stopping early leaves no new readiness event behind, so the
        // next wakeup retries.
        self.accept_stalled = false;
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => self.admit(stream, peer_addr)?,
                Err(err) => match err.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset => {
                        warn!(?err, "Transient accept error");
                        continue;
                    }
                    _ => {
                        error!(?err, "Error accepting connection");
                        self.accept_stalled = true;
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    fn admit(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<(), Error> {
        let Some(handle) = self.registry.next_free_handle() else {
            warn!(%peer_addr, live = self.registry.len(), "Registry full, dropping connection");
            return Ok(());
        };

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer_addr, ?err, "Failed to set TCP_NODELAY");
        }
        if let Err(err) = self
            .poll
            .registry()
            .register(&mut stream, Token(handle), Interest::READABLE)
        {
            warn!(%peer_addr, ?err, "Failed to register connection, dropping it");
            return Ok(());
        }

        // An occupied slot means the registry is corrupt; that one is fatal.
        let peer = self.registry.admit(handle, stream)?;
        send_to_peer(peer.conn_mut(), handle, WELCOME_MSG);
        info!(id = handle, %peer_addr, nick = %peer.display_nick(), "Connected client");
        Ok(())
    }

    // Reads until the socket would block, dispatches every complete message,
    // and evicts the peer if it closed or failed.
    #[instrument(skip(self))]
    fn service_peer(&mut self, id: Handle) {
        let read_buf_size = self.read_buf_size;
        let Some(peer) = self.registry.get_mut(id) else {
            debug!(id, "Readiness for unknown peer");
            return;
        };

        let mut buf = vec![0u8; read_buf_size];
        let mut messages = Vec::new();
        let mut disconnect = false;

        loop {
            match peer.conn_mut().read(&mut buf) {
                Ok(0) => {
                    disconnect = true;
                    break;
                }
                Ok(sz) => {
                    trace!(len = sz, "Read data from socket");
                    messages.extend(peer.inbound_mut().push(&buf[..sz]));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if err.kind() == ErrorKind::ConnectionReset {
                        warn!("Connection reset");
                    } else {
                        error!(?err, "Error reading from socket");
                    }
                    disconnect = true;
                    break;
                }
            }
        }

        for msg in &messages {
            let outcome = self.dispatcher.dispatch(&mut self.registry, id, msg);
            trace!(?outcome, "Dispatched");
        }

        if disconnect {
            self.evict(id);
        }
    }

    fn evict(&mut self, id: Handle) {
        let Some(peer) = self.registry.evict(id) else {
            return;
        };
        info!(id, nick = %peer.display_nick(), "Disconnected client");

        let mut stream = peer.into_conn();
        if let Err(err) = self.poll.registry().deregister(&mut stream) {
            warn!(id, ?err, "Failed to deregister connection");
        }
        // Dropping the stream closes the socket.
    }
}
