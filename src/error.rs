use thiserror::Error;

use crate::channel::ChannelError;

/// Errors a session operation may surface.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration cannot be used to open a port.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `open` was called on a session which already holds its port.
    #[error("The port `{0}` is already open")]
    AlreadyOpen(String),

    /// An operation which needs an open port was called while closed.
    #[error("The port `{0}` is not open")]
    NotOpen(String),

    /// The backend reported a failure. Carried unchanged.
    #[error(transparent)]
    Backend(#[from] ChannelError),
}

impl Error {
    /// Borrow the error as the backend variant.
    pub fn as_backend(&self) -> Option<&ChannelError> {
        if let Self::Backend(e) = self {
            Some(e)
        } else {
            None
        }
    }
}
