use thiserror::Error;

/// The error type for smallchat operations.
///
/// Only unrecoverable conditions surface as errors: failing to bind the
/// listening socket, a failed readiness wait, or a registry consistency
/// violation. Per-connection trouble (a peer resetting its connection, a short
/// write during broadcast) is handled inside the event loop by evicting the
/// peer or ignoring the write, and never reaches the caller.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // I/O and Networking Errors
    // ============================================================================
    /// Low-level I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provided socket address could not be parsed or resolved.
    #[error("Invalid socket address")]
    InvalidAddress,

    /// Waiting for readiness failed.
    #[error("Poll error: {0}")]
    PollError(String),

    /// The server's event loop is no longer running.
    #[error("Server has stopped")]
    ServerStopped,

    // ============================================================================
    // Registry Errors
    // ============================================================================
    /// A peer was admitted into a slot that is still occupied.
    ///
    /// Handles are only reused after their peer has been evicted, so this
    /// indicates corrupted registry state.
    #[error("Registry slot {handle} is already occupied")]
    SlotOccupied {
        /// The handle whose slot was occupied.
        handle: usize,
    },

    /// A handle outside the registry's slot range was used.
    #[error("Handle {handle} out of range (capacity {capacity})")]
    HandleOutOfRange { handle: usize, capacity: usize },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    /// Configuration file parsing or key lookup failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid value for the `framing` configuration key.
    #[error("Invalid framing '{got}', expected one of: {}", .valid.join(", "))]
    InvalidFraming { got: String, valid: Vec<String> },

    /// `max_clients` is larger than the registry can hold.
    #[error("max_clients {got} exceeds the limit of {limit}")]
    TooManyClients { got: usize, limit: usize },
}
