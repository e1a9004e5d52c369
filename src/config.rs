//! Configuration for the chat server and client.
//!
//! Values are looked up in a [`config::Config`] with optional namespacing:
//! `{name}.{key}` first, then `{key}`, then a hard-coded default.
//!
//! ```toml
//! bind = "0.0.0.0:7711"
//! max_clients = 1000
//! framing = "line"
//!
//! [lobby]
//! max_line_len = 512
//! ```

use crate::error::Error;
use crate::framing::Framing;
use ::config::Config;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:7711";
pub const DEFAULT_SERVER: &str = "127.0.0.1:7711";
pub const DEFAULT_MAX_CLIENTS: usize = 1000;
pub const DEFAULT_MAX_LINE_LEN: usize = 256;
pub const DEFAULT_READ_BUF_SIZE: usize = 256;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_POLL_CAPACITY: usize = 256;

/// Upper bound for `max_clients`. Registry slots are allocated up front and
/// peer handles must stay clear of the server's reserved poll tokens.
pub const MAX_CLIENTS_LIMIT: usize = 1 << 20;

pub(crate) fn get_namespaced_value<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<T, config::ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, config::ConfigError>,
{
    if name.is_empty() {
        getter(config, key)
    } else {
        getter(config, &format!("{name}.{key}")).or_else(|_| getter(config, key))
    }
}

pub(crate) fn get_namespaced_usize(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<usize, config::ConfigError> {
    get_namespaced_value(config, name, key, |cfg, key| cfg.get::<usize>(key))
}

pub(crate) fn get_namespaced_string(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<String, config::ConfigError> {
    get_namespaced_value(config, name, key, Config::get_string)
}

// A missing key falls back to the default; a present but malformed key is an
// error.
fn optional<T>(result: Result<T, config::ConfigError>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Settings for [`ChatServer`](crate::ChatServer).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub bind: String,
    /// Maximum number of concurrently connected peers (registry slots).
    pub max_clients: usize,
    /// Maximum length of a framed chat line, including the name prefix.
    pub max_line_len: usize,
    /// Size of a single socket read.
    pub read_buf_size: usize,
    /// Idle timeout of the readiness wait.
    pub poll_timeout: Duration,
    /// Capacity of the poll event buffer.
    pub poll_capacity: usize,
    /// How inbound bytes are split into messages.
    pub framing: Framing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_buf_size: DEFAULT_READ_BUF_SIZE,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            poll_capacity: DEFAULT_POLL_CAPACITY,
            framing: Framing::Line,
        }
    }
}

impl ServerConfig {
    /// Reads the server settings from `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::from_config_named(config, "")
    }

    /// Reads the server settings from `config`, preferring keys under the
    /// `name` table.
    ///
    /// # Configuration Keys
    ///
    /// - `bind`: listen address (default `0.0.0.0:7711`)
    /// - `max_clients`: registry capacity (default 1000, at most
    ///   [`MAX_CLIENTS_LIMIT`])
    /// - `max_line_len`: chat line limit in bytes (default 256)
    /// - `read_buf_size`: bytes per socket read (default 256)
    /// - `poll_timeout_ms`: idle wakeup interval (default 1000)
    /// - `poll_capacity`: events per poll (default 256)
    /// - `framing`: `"line"` or `"raw"` (default `"line"`)
    pub fn from_config_named(config: &Config, name: &str) -> Result<Self, Error> {
        let defaults = Self::default();

        let bind = optional(get_namespaced_string(config, name, "bind"))?.unwrap_or(defaults.bind);
        let max_clients = optional(get_namespaced_usize(config, name, "max_clients"))?
            .unwrap_or(defaults.max_clients);
        let max_line_len = optional(get_namespaced_usize(config, name, "max_line_len"))?
            .unwrap_or(defaults.max_line_len);
        let read_buf_size = optional(get_namespaced_usize(config, name, "read_buf_size"))?
            .unwrap_or(defaults.read_buf_size);
        let poll_timeout = optional(get_namespaced_usize(config, name, "poll_timeout_ms"))?
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(defaults.poll_timeout);
        let poll_capacity = optional(get_namespaced_usize(config, name, "poll_capacity"))?
            .unwrap_or(defaults.poll_capacity);
        let framing = match optional(get_namespaced_string(config, name, "framing"))? {
            Some(value) => value.parse()?,
            None => defaults.framing,
        };

        let config = Self {
            bind,
            max_clients,
            max_line_len: max_line_len.max(1),
            read_buf_size: read_buf_size.max(1),
            poll_timeout,
            poll_capacity: poll_capacity.max(1),
            framing,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the limits that cannot be clamped silently.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_clients > MAX_CLIENTS_LIMIT {
            return Err(Error::TooManyClients {
                got: self.max_clients,
                limit: MAX_CLIENTS_LIMIT,
            });
        }
        Ok(())
    }
}

/// Settings for [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Server address to connect to.
    pub server: String,
    /// Size of a single socket read.
    pub read_buf_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            read_buf_size: DEFAULT_READ_BUF_SIZE,
        }
    }
}

impl ClientConfig {
    /// Reads the client settings from `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::from_config_named(config, "")
    }

    /// Reads the client settings from `config`, preferring keys under the
    /// `name` table.
    pub fn from_config_named(config: &Config, name: &str) -> Result<Self, Error> {
        let defaults = Self::default();
        let server =
            optional(get_namespaced_string(config, name, "server"))?.unwrap_or(defaults.server);
        let read_buf_size = optional(get_namespaced_usize(config, name, "read_buf_size"))?
            .unwrap_or(defaults.read_buf_size);
        Ok(Self {
            server,
            read_buf_size: read_buf_size.max(1),
        })
    }
}
