//! Line-oriented chat client.
//!
//! The client waits on two sources at once: the server socket and the local
//! input. Input is read on a helper thread that forwards whole lines over a
//! channel and wakes the poll, so neither source can block the other.

use crate::config::ClientConfig;
use crate::error::Error;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{BufRead, ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{
    mpsc::{channel, Receiver},
    Arc,
};
use std::thread;
use tracing::{debug, info, instrument, trace, warn};

const SERVER_ID: usize = 0;
const WAKE_ID: usize = 1;

/// Why [`ChatClient::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server closed the connection.
    ServerClosed,
    /// Local input reached end of file and all typed lines were sent.
    InputClosed,
}

// One item from the input thread, without its terminator. `None` marks end
// of input.
type InputLine = Option<Vec<u8>>;

/// A connected chat client.
#[derive(Debug)]
pub struct ChatClient {
    stream: TcpStream,
    server_addr: SocketAddr,
    poll: Poll,
    waker: Arc<Waker>,
    interest: Interest,
    send_buf: Vec<u8>,
    read_buf_size: usize,
}

impl ChatClient {
    /// Connects to the configured server.
    pub fn connect(config: &ClientConfig) -> Result<Self, Error> {
        let server_addr = config
            .server
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;

        // Connect blocking so a refused connection is reported right here.
        let std_stream = std::net::TcpStream::connect(server_addr)?;
        std_stream.set_nodelay(true)?;
        std_stream.set_nonblocking(true)?;
        let mut stream = TcpStream::from_std(std_stream);

        let poll = Poll::new()?;
        let interest = Interest::READABLE;
        poll.registry()
            .register(&mut stream, Token(SERVER_ID), interest)?;
        let waker = Arc::new(Waker::new(poll.registry(), Token(WAKE_ID))?);

        info!(%server_addr, "Connected to server");

        Ok(Self {
            stream,
            server_addr,
            poll,
            waker,
            interest,
            send_buf: Vec::new(),
            read_buf_size: config.read_buf_size,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Runs until the server hangs up or `input` is exhausted.
    ///
    /// Every input line is echoed to `output` as `you> <line>` and sent to the
    /// server. Bytes from the server are copied to `output` as they arrive.
    #[instrument(skip_all, fields(server = %self.server_addr))]
    pub fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<ClientExit, Error>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let lines = self.spawn_input_reader(input);
        let mut events = Events::with_capacity(16);
        let mut input_closed = false;

        loop {
            if let Err(err) = self.poll.poll(&mut events, None) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::PollError(err.to_string()));
            }

            for event in events.iter() {
                match event.token() {
                    Token(WAKE_ID) => {
                        for line in lines.try_iter() {
                            match line {
                                Some(line) => {
                                    output.write_all(b"you> ")?;
                                    output.write_all(&line)?;
                                    output.write_all(b"\n")?;
                                    output.flush()?;
                                    if !self.queue_line(&line)? {
                                        return self.connection_lost(output);
                                    }
                                }
                                None => input_closed = true,
                            }
                        }
                    }
                    Token(SERVER_ID) => {
                        if event.is_readable() && !self.read_server(output)? {
                            return self.connection_lost(output);
                        }
                        if event.is_writable() && !self.flush_send_buf()? {
                            return self.connection_lost(output);
                        }
                    }
                    Token(id) => warn!(id, "Unexpected token"),
                }
            }

            if input_closed && self.send_buf.is_empty() {
                debug!("Input closed");
                return Ok(ClientExit::InputClosed);
            }
        }
    }

    fn spawn_input_reader<R>(&self, input: R) -> Receiver<InputLine>
    where
        R: BufRead + Send + 'static,
    {
        let (sender, receiver) = channel();
        let waker = self.waker.clone();

        thread::spawn(move || {
            // Raw bytes, whatever the encoding.
            for line in input.split(b'\n') {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(?err, "Error reading input");
                        break;
                    }
                };
                if sender.send(Some(line)).is_err() || waker.wake().is_err() {
                    return;
                }
            }
            let _ = sender.send(None);
            let _ = waker.wake();
        });

        receiver
    }

    // Returns false once the server has closed the connection.
    fn read_server<W: Write>(&mut self, output: &mut W) -> Result<bool, Error> {
        let mut buf = vec![0u8; self.read_buf_size];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(sz) => {
                    trace!(len = sz, "Read data from server");
                    output.write_all(&buf[..sz])?;
                    output.flush()?;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(?err, "Error reading from server");
                    return Ok(false);
                }
            }
        }
    }

    fn connection_lost<W: Write>(&self, output: &mut W) -> Result<ClientExit, Error> {
        info!(server = %self.server_addr, "Connection lost");
        writeln!(output, "Connection lost")?;
        output.flush()?;
        Ok(ClientExit::ServerClosed)
    }

    // Returns false if the connection failed while sending.
    fn queue_line(&mut self, line: &[u8]) -> Result<bool, Error> {
        self.send_buf.extend_from_slice(line);
        self.send_buf.push(b'\n');
        self.flush_send_buf()
    }

    // Writes as much of the send buffer as the socket takes and keeps
    // WRITABLE interest only while something is left. Returns false if the
    // connection failed.
    fn flush_send_buf(&mut self) -> Result<bool, Error> {
        let mut send_pos = 0;
        while send_pos < self.send_buf.len() {
            match self.stream.write(&self.send_buf[send_pos..]) {
                Ok(0) => break,
                Ok(sz) => send_pos += sz,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(?err, "Error writing to server");
                    return Ok(false);
                }
            }
        }
        self.send_buf.drain(..send_pos);

        let interest = if self.send_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if interest != self.interest {
            self.poll
                .registry()
                .reregister(&mut self.stream, Token(SERVER_ID), interest)?;
            self.interest = interest;
        }
        Ok(true)
    }
}
