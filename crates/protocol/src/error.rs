//! Error types for the protocol crate.

use thiserror::Error;

use crate::constants::KEY_LENGTH;

/// Protocol error type covering every way a seal, open or exchange can fail.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Key material is not exactly 32 bytes.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    KeyLength {
        /// Required key length.
        expected: usize,
        /// Actual key length supplied.
        got: usize,
    },

    /// Textual key material could not be decoded.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// Envelope fields are not valid base64 or decode to the wrong length.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Plaintext exceeds what AES-GCM can seal under one nonce.
    #[error("message too large: {size} bytes exceeds the AEAD limit")]
    MessageTooLarge {
        /// Plaintext size in bytes.
        size: usize,
    },

    /// The authentication tag did not verify.
    #[error("authentication failed: envelope was tampered with or sealed under a different key")]
    Authentication,

    /// The send/receive step failed outside the codec.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProtocolError {
    /// Creates a `KeyLength` error for a key of `got` bytes.
    pub fn key_length(got: usize) -> Self {
        ProtocolError::KeyLength {
            expected: KEY_LENGTH,
            got,
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::KeyLength { .. } | ProtocolError::MalformedKey(_) => ErrorKind::KeyLength,
            ProtocolError::MalformedEnvelope(_) | ProtocolError::MessageTooLarge { .. } => {
                ErrorKind::MalformedEnvelope
            }
            ProtocolError::Authentication => ErrorKind::Authentication,
            ProtocolError::Transport(_) => ErrorKind::Transport,
        }
    }
}

/// Coarse failure classification delivered to callers of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key is unusable.
    KeyLength,
    /// Envelope is corrupted or non-conforming.
    MalformedEnvelope,
    /// Tag verification failed.
    Authentication,
    /// Network, status or empty-body failure.
    Transport,
}

impl ErrorKind {
    /// Stable snake_case name, suitable for logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::KeyLength => "key_length",
            ErrorKind::MalformedEnvelope => "malformed_envelope",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::MalformedEnvelope(err.to_string())
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::MalformedEnvelope(format!("invalid base64: {}", err))
    }
}
