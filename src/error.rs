//! Error types for GlobalPlatform operations

use thiserror::Error;

use crate::response::StatusWord;
use crate::transport::TransportError;

/// Result type for GlobalPlatform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No Security Domain could be selected; carries the last status word
    #[error("could not select any Security Domain (last SW: {0})")]
    SelectionFailed(StatusWord),

    /// The card answered with a different protocol than requested
    #[error("secure channel protocol mismatch: {0}")]
    ProtocolMismatch(&'static str),

    /// Card authentication failed
    #[error("card authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Response MAC verification failed or the response was malformed for it
    #[error("security error: {0}")]
    Security(&'static str),

    /// The wrapped APDU would exceed the short-APDU payload limit
    #[error("APDU too long for wrapping ({0} byte payload)")]
    ApduTooLong(usize),

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// A privileged command returned a non-9000 status word
    #[error("{operation} failed with status {status}")]
    CardStatus {
        /// The operation that failed
        operation: &'static str,
        /// The status word returned by the card
        status: StatusWord,
    },

    /// Operation attempted on an invalidated secure channel
    #[error("secure channel closed")]
    ChannelClosed,

    /// Invalid configuration (key set, SCP variant, security level)
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// Wrong data length
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid or unparseable response data
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}

impl Error {
    /// Check if this error carries a specific card status
    pub const fn is_status(&self, status: u16) -> bool {
        matches!(self, Self::CardStatus { status: sw, .. } if sw.to_u16() == status)
    }

    /// Try to extract a status word if this error contains one
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::CardStatus { status, .. } => Some(*status),
            Self::SelectionFailed(sw) => Some(*sw),
            _ => None,
        }
    }
}
