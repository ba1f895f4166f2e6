use std::time::Duration;

use arq_abstract::{ConfigError, EncodeError};
use arq_core::WindowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("frame of {0} bytes does not fit in one datagram")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("sending endpoint needs a peer address")]
    MissingPeer,
    #[error("endpoint has shut down")]
    Closed,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("endpoint task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
