//! Error types for the lan-sync protocol.

use std::fmt;

/// Result type alias for lan-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, sending or receiving protocol messages.
#[derive(Debug)]
pub enum Error {
    /// A node identifier is not a word of at most 16 characters.
    InvalidNodeId(String),

    /// A numeric field is outside its allowed range.
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: i64,
        /// Largest accepted value.
        max: i64,
    },

    /// A data record exceeds the maximum record length.
    DataTooLong {
        /// Length of the record in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A data record contains the field delimiter.
    InvalidData(String),

    /// An advertisement already lists the maximum number of peers.
    TooManyPeers,

    /// The destination of a request is not in the peer table.
    UnknownPeer(String),

    /// A payload could not be decoded as the expected message kind.
    Decode(String),

    /// The broadcast transport failed.
    Transport(String),

    /// An actor was used before being bound to a dispatcher.
    NotBound(&'static str),

    /// The node has been shut down.
    Shutdown,

    /// Internal channel error.
    Channel(String),

    /// Configuration error.
    Config(String),

    /// Generic IO error.
    Io(std::io::Error),
}

impl Error {
    /// Returns true if this error is the cooperative shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidNodeId(id) => {
                write!(f, "node id must be a word of at most 16 characters: {:?}", id)
            }
            Error::OutOfRange { field, value, max } => {
                write!(f, "{} must be in [0;{}] (got {})", field, max, value)
            }
            Error::DataTooLong { len, max } => {
                write!(f, "data record is {} characters, maximum is {}", len, max)
            }
            Error::InvalidData(data) => {
                write!(f, "data record must not contain ';': {:?}", data)
            }
            Error::TooManyPeers => {
                write!(f, "advertisement already lists 255 peers")
            }
            Error::UnknownPeer(id) => {
                write!(f, "peer is not in the peer table: {}", id)
            }
            Error::Decode(msg) => {
                write!(f, "failed to decode message: {}", msg)
            }
            Error::Transport(msg) => {
                write!(f, "transport error: {}", msg)
            }
            Error::NotBound(actor) => {
                write!(f, "{} is not bound to a dispatcher", actor)
            }
            Error::Shutdown => {
                write!(f, "node has been shut down")
            }
            Error::Channel(msg) => {
                write!(f, "channel error: {}", msg)
            }
            Error::Config(msg) => {
                write!(f, "configuration error: {}", msg)
            }
            Error::Io(err) => {
                write!(f, "IO error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(err: async_channel::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}

impl From<async_channel::RecvError> for Error {
    fn from(err: async_channel::RecvError) -> Self {
        Error::Channel(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OutOfRange {
            field: "interval",
            value: 300,
            max: 255,
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("255"));
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "test error");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_shutdown() {
        assert!(Error::Shutdown.is_shutdown());
        assert!(!Error::TooManyPeers.is_shutdown());
    }
}
