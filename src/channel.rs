use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DataBits, FlowControl, Parity, SessionConfig, StopBits};

/// Errors the backend driver reports through the command channel.
///
/// Sessions never inspect or rewrite these; they travel to the
/// caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ChannelError {
    /// The backend has no open port at the given path.
    #[error("No open port at `{0}`")]
    PortNotFound(String),

    /// The underlying driver rejected the operation.
    #[error("Driver failure: {0}")]
    Driver(String),

    /// The transport carrying the command itself failed.
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// The full link configuration sent with an `open` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Which port to open.
    pub path: String,

    /// Link speed in bits per second.
    pub baud_rate: u32,

    /// Data bits per character.
    pub data_bits: DataBits,

    /// Parity scheme.
    pub parity: Parity,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Flow control on the link.
    pub flow_control: FlowControl,

    /// Read timeout the driver should apply.
    pub timeout: Duration,
}

impl From<&SessionConfig> for OpenOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            path: config.path.clone(),
            baud_rate: config.baud_rate,
            data_bits: config.data_bits,
            parity: config.parity,
            stop_bits: config.stop_bits,
            flow_control: config.flow_control,
            timeout: config.timeout,
        }
    }
}

/// The request/response interface to the backend driver.
///
/// Every operation suspends the caller until the backend answers.
/// Implementations typically marshal these calls to a host process;
/// [`MockBackend`](crate::mock::MockBackend) keeps them in memory.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Open the port described by `options`.
    async fn open(&self, options: OpenOptions) -> Result<(), ChannelError>;

    /// Close the port at `path`.
    async fn close(&self, path: &str) -> Result<(), ChannelError>;

    /// Put text on the wire. Returns the number of bytes written.
    async fn write(&self, path: &str, value: &str) -> Result<usize, ChannelError>;

    /// Put raw bytes on the wire. Returns the number of bytes written.
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<usize, ChannelError>;

    /// Pull up to `size` bytes from the port.
    ///
    /// Data does not come back on this call; the backend emits it
    /// asynchronously on the port's read topic.
    async fn read(&self, path: &str, timeout: Duration, size: usize) -> Result<(), ChannelError>;

    /// Stop any emission loop the backend runs for `path`.
    async fn cancel_read(&self, path: &str) -> Result<(), ChannelError>;

    /// Enumerate the port identifiers currently visible to the backend.
    async fn available_ports(&self) -> Result<Vec<String>, ChannelError>;

    /// Close the port at `path` no matter who opened it.
    async fn force_close(&self, path: &str) -> Result<(), ChannelError>;

    /// Close every port the backend holds open.
    async fn close_all(&self) -> Result<(), ChannelError>;
}
