//! Pre-shared key material.
//!
//! Both peers hold the same 32-byte key, provisioned out of band. The key is
//! immutable once constructed, zeroized on drop and redacted from `Debug`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::constants::KEY_LENGTH;
use crate::error::{ProtocolError, Result};

/// A 256-bit symmetric key shared by client and server.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_LENGTH]);

impl SharedKey {
    /// Creates a key from an owned 32-byte array.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice.
    ///
    /// Fails with [`ProtocolError::KeyLength`] unless the slice is exactly
    /// 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(ProtocolError::key_length(bytes.len()));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Generates a new random key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Parses a key from 64 hex characters. Surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(text.trim()).map_err(|e| ProtocolError::MalformedKey(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    /// Parses a key from standard, padded base64. Surrounding whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(text.trim())
                .map_err(|e| ProtocolError::MalformedKey(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    /// Parses a key given either as hex or as base64.
    ///
    /// A 64-character string of hex digits is read as hex; anything else is
    /// tried as base64.
    pub fn from_text(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.len() == KEY_LENGTH * 2 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(trimmed)
        } else {
            Self::from_base64(trimmed)
        }
    }

    /// Returns the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the key as standard, padded base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl PartialEq for SharedKey {
    /// Compares in constant time.
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for SharedKey {}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedKey").field(&"[REDACTED]").finish()
    }
}
