//! Envelope codec: AES-256-GCM sealing and opening.
//!
//! The codec turns a plaintext into an [`Envelope`] and back. Each seal draws
//! a fresh 96-bit nonce from the OS CSPRNG; no associated data is bound and
//! the 128-bit tag travels detached from the ciphertext.
//!
//! # Concurrency
//!
//! [`EnvelopeCodec`] holds only the expanded key schedule and never mutates
//! it, so one instance can be shared behind an `Arc` by any number of tasks.
//!
//! # Example
//!
//! ```rust
//! use protocol::{EnvelopeCodec, SharedKey};
//!
//! let codec = EnvelopeCodec::new(&SharedKey::generate());
//! let envelope = codec.seal(b"hello").unwrap();
//! assert_eq!(codec.open(&envelope).unwrap(), b"hello");
//! ```

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::constants::{KEY_LENGTH, NONCE_LENGTH, TAG_LENGTH};
use crate::envelope::{DecodedEnvelope, Envelope};
use crate::error::{ProtocolError, Result};
use crate::key::SharedKey;

/// Seals and opens envelopes under one pre-shared key.
#[derive(Clone)]
pub struct EnvelopeCodec {
    cipher: Aes256Gcm,
}

impl EnvelopeCodec {
    /// Creates a codec bound to `key`.
    pub fn new(key: &SharedKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Creates a codec from raw key bytes.
    ///
    /// Fails with [`ProtocolError::KeyLength`] unless `key` is exactly 32 bytes.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        Ok(Self::new(&SharedKey::from_slice(key)?))
    }

    /// Seals `plaintext` under a freshly generated nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Envelope> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| ProtocolError::MessageTooLarge {
                size: plaintext.len(),
            })?;

        let mut auth_tag = [0u8; TAG_LENGTH];
        auth_tag.copy_from_slice(&tag);

        tracing::trace!(plaintext_len = plaintext.len(), "sealed envelope");

        Ok(DecodedEnvelope {
            nonce,
            cipher_text: buffer,
            auth_tag,
        }
        .encode())
    }

    /// Verifies and decrypts `envelope`.
    ///
    /// On tag mismatch nothing but [`ProtocolError::Authentication`] is
    /// returned; the working buffer is wiped before the error propagates.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let DecodedEnvelope {
            nonce,
            cipher_text,
            auth_tag,
        } = envelope.decode()?;

        let mut buffer = cipher_text;
        if self
            .cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&auth_tag),
            )
            .is_err()
        {
            buffer.zeroize();
            tracing::trace!("envelope failed authentication");
            return Err(ProtocolError::Authentication);
        }

        tracing::trace!(plaintext_len = buffer.len(), "opened envelope");
        Ok(buffer)
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("cipher", &"AES-256-GCM")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Seals `plaintext` under `key`.
///
/// The key length is checked before any cryptographic work.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Envelope> {
    ensure_key_length(key)?;
    EnvelopeCodec::from_key_bytes(key)?.seal(plaintext)
}

/// Opens `envelope` under `key`.
///
/// The key length is checked before the envelope is even decoded.
pub fn open(key: &[u8], envelope: &Envelope) -> Result<Vec<u8>> {
    ensure_key_length(key)?;
    EnvelopeCodec::from_key_bytes(key)?.open(envelope)
}

fn ensure_key_length(key: &[u8]) -> Result<()> {
    if key.len() != KEY_LENGTH {
        return Err(ProtocolError::key_length(key.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::sync::Arc;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(&SharedKey::generate())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let codec = codec();
        let plaintext = br#"{"message": "Hello from the client!"}"#;

        let envelope = codec.seal(plaintext).unwrap();
        assert_eq!(codec.open(&envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_empty_plaintext() {
        let codec = codec();
        let envelope = codec.seal(b"").unwrap();

        let decoded = envelope.decode().unwrap();
        assert!(decoded.cipher_text.is_empty());
        assert!(codec.open(&envelope).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_large_plaintext() {
        let codec = codec();
        let plaintext: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();

        let envelope = codec.seal(&plaintext).unwrap();
        assert_eq!(codec.open(&envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_field_lengths() {
        let codec = codec();
        let plaintext = b"hello world";
        let decoded = codec.seal(plaintext).unwrap().decode().unwrap();

        assert_eq!(decoded.nonce.len(), NONCE_LENGTH);
        assert_eq!(decoded.cipher_text.len(), plaintext.len());
        assert_eq!(decoded.auth_tag.len(), TAG_LENGTH);
        assert_ne!(decoded.cipher_text, plaintext);
    }

    #[test]
    fn test_every_ciphertext_bit_flip_is_detected() {
        let codec = codec();
        let decoded = codec.seal(b"hello").unwrap().decode().unwrap();

        for byte in 0..decoded.cipher_text.len() {
            for bit in 0..8 {
                let mut tampered = decoded.clone();
                tampered.cipher_text[byte] ^= 1 << bit;
                let err = codec.open(&tampered.encode()).unwrap_err();
                assert!(
                    matches!(err, ProtocolError::Authentication),
                    "byte {} bit {} not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_every_tag_bit_flip_is_detected() {
        let codec = codec();
        let decoded = codec.seal(b"hello").unwrap().decode().unwrap();

        for byte in 0..TAG_LENGTH {
            for bit in 0..8 {
                let mut tampered = decoded.clone();
                tampered.auth_tag[byte] ^= 1 << bit;
                let err = codec.open(&tampered.encode()).unwrap_err();
                assert!(matches!(err, ProtocolError::Authentication));
            }
        }
    }

    #[test]
    fn test_substituted_nonce_is_detected() {
        let codec = codec();
        let first = codec.seal(b"first").unwrap();
        let second = codec.seal(b"second").unwrap();

        let mut swapped = first.clone();
        swapped.nonce = second.nonce.clone();

        let err = codec.open(&swapped).unwrap_err();
        assert!(matches!(err, ProtocolError::Authentication));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sender = codec();
        let receiver = codec();

        let envelope = sender.seal(b"secret data").unwrap();
        let err = receiver.open(&envelope).unwrap_err();
        assert!(matches!(err, ProtocolError::Authentication));
    }

    #[test]
    fn test_nonce_freshness() {
        let codec = codec();
        let first = codec.seal(b"same plaintext").unwrap();
        let second = codec.seal(b"same plaintext").unwrap();

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.cipher_text, second.cipher_text);
    }

    #[test]
    fn test_free_functions_validate_key_length() {
        for len in [0usize, 16, 31, 33] {
            let key = vec![0u8; len];
            let err = seal(&key, b"hello").unwrap_err();
            assert!(matches!(err, ProtocolError::KeyLength { got, .. } if got == len));

            // Key length is checked before the (garbage) envelope is decoded.
            let garbage = Envelope::new("!", "!", "!");
            let err = open(&key, &garbage).unwrap_err();
            assert!(matches!(err, ProtocolError::KeyLength { got, .. } if got == len));
        }
    }

    #[test]
    fn test_free_functions_roundtrip() {
        let key = [0x42u8; KEY_LENGTH];
        let envelope = seal(&key, b"payload").unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), b"payload");
    }

    #[test]
    fn test_open_malformed_envelopes() {
        let codec = codec();
        let valid = codec.seal(b"hello").unwrap();

        let mut bad_nonce = valid.clone();
        bad_nonce.nonce = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            codec.open(&bad_nonce).unwrap_err(),
            ProtocolError::MalformedEnvelope(_)
        ));

        let mut bad_tag = valid.clone();
        bad_tag.auth_tag = STANDARD.encode([0u8; 15]);
        assert!(matches!(
            codec.open(&bad_tag).unwrap_err(),
            ProtocolError::MalformedEnvelope(_)
        ));

        let mut bad_text = valid;
        bad_text.cipher_text = "not base64!".to_string();
        assert!(matches!(
            codec.open(&bad_text).unwrap_err(),
            ProtocolError::MalformedEnvelope(_)
        ));
    }

    #[test]
    fn test_zero_key_hello_scenario() {
        let key = [0u8; KEY_LENGTH];
        let envelope = seal(&key, b"hello").unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), b"hello");
    }

    #[test]
    fn test_shared_codec_across_threads() {
        let codec = Arc::new(codec());

        std::thread::scope(|scope| {
            for i in 0..8 {
                let codec = Arc::clone(&codec);
                scope.spawn(move || {
                    let plaintext = format!("message {}", i);
                    let envelope = codec.seal(plaintext.as_bytes()).unwrap();
                    assert_eq!(codec.open(&envelope).unwrap(), plaintext.as_bytes());
                });
            }
        });
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", codec());
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_codec_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EnvelopeCodec>();
    }
}
