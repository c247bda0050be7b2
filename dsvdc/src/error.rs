use std::io;

use crate::properties::ValueType;

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Invalid parameter: '{0}'")]
    Param(String),
    #[error("Resource exhausted")]
    ResourceExhausted,
    #[error("Transport error: {0}")]
    Transport(io::ErrorKind),
    #[error("Not connected to a session manager")]
    NotConnected,
    #[error("Timeout Error")]
    Timeout,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Property type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
    #[error("Unsound property structure: {0}")]
    Structural(String),
    #[error("Not found: '{0}'")]
    NotFound(String),
    #[error("Property index {0} out of range")]
    IndexOutOfRange(usize),
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, source: None }
    }

    pub fn with_source<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Error {
            kind,
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// True for errors that mean the peer connection is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotConnected
                | ErrorKind::Transport(
                    io::ErrorKind::BrokenPipe
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::UnexpectedEof
                )
        )
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Error::with_source(ErrorKind::Timeout, e)
            }
            kind => Error::with_source(ErrorKind::Transport(kind), e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Protocol(e.to_string()), e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
