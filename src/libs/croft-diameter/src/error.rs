//! Diameter error types

use thiserror::Error;

/// Errors raised by the Diameter codec, transport and client
#[derive(Error, Debug)]
pub enum DiameterError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("missing AVP: {0}")]
    MissingAvp(&'static str),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("capabilities exchange rejected with result code {0}")]
    CapabilitiesRejected(u32),

    #[error("peer connection is closed")]
    PeerClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type DiameterResult<T> = Result<T, DiameterError>;
