//! Wire representation of a sealed message.
//!
//! An envelope travels as a JSON object with three base64 text fields:
//!
//! ```text
//! {
//!   "nonce":      "<base64, 12 bytes>",
//!   "cipherText": "<base64, plaintext-length bytes>",
//!   "authTag":    "<base64, 16 bytes>"
//! }
//! ```
//!
//! Field order is irrelevant and unknown fields are ignored. An envelope is
//! created once per seal and consumed once per open; nothing mutates it in
//! between.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::{FIELD_AUTH_TAG, FIELD_CIPHER_TEXT, FIELD_NONCE, NONCE_LENGTH, TAG_LENGTH};
use crate::error::{ProtocolError, Result};

/// A sealed message in its textual wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 nonce used for this sealing operation.
    pub nonce: String,
    /// Base64 ciphertext, same length as the plaintext once decoded.
    #[serde(rename = "cipherText")]
    pub cipher_text: String,
    /// Base64 authentication tag.
    #[serde(rename = "authTag")]
    pub auth_tag: String,
}

impl Envelope {
    /// Creates an envelope from already-encoded fields.
    pub fn new(
        nonce: impl Into<String>,
        cipher_text: impl Into<String>,
        auth_tag: impl Into<String>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            cipher_text: cipher_text.into(),
            auth_tag: auth_tag.into(),
        }
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// Only the shape is checked here; field contents are validated by
    /// [`Envelope::decode`].
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decodes the three base64 fields and checks their lengths.
    pub fn decode(&self) -> Result<DecodedEnvelope> {
        let nonce = decode_field(FIELD_NONCE, &self.nonce)?;
        let cipher_text = decode_field(FIELD_CIPHER_TEXT, &self.cipher_text)?;
        let auth_tag = decode_field(FIELD_AUTH_TAG, &self.auth_tag)?;

        let nonce: [u8; NONCE_LENGTH] = nonce.as_slice().try_into().map_err(|_| {
            ProtocolError::MalformedEnvelope(format!(
                "{} must be {} bytes, got {}",
                FIELD_NONCE,
                NONCE_LENGTH,
                nonce.len()
            ))
        })?;
        let auth_tag: [u8; TAG_LENGTH] = auth_tag.as_slice().try_into().map_err(|_| {
            ProtocolError::MalformedEnvelope(format!(
                "{} must be {} bytes, got {}",
                FIELD_AUTH_TAG,
                TAG_LENGTH,
                auth_tag.len()
            ))
        })?;

        Ok(DecodedEnvelope {
            nonce,
            cipher_text,
            auth_tag,
        })
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value).map_err(|e| {
        ProtocolError::MalformedEnvelope(format!("{} is not valid base64: {}", name, e))
    })
}

/// An envelope with its fields decoded to raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEnvelope {
    /// The 96-bit nonce.
    pub nonce: [u8; NONCE_LENGTH],
    /// The ciphertext, without the tag.
    pub cipher_text: Vec<u8>,
    /// The 128-bit authentication tag.
    pub auth_tag: [u8; TAG_LENGTH],
}

impl DecodedEnvelope {
    /// Encodes the raw fields back into the textual wire form.
    pub fn encode(&self) -> Envelope {
        Envelope {
            nonce: STANDARD.encode(self.nonce),
            cipher_text: STANDARD.encode(&self.cipher_text),
            auth_tag: STANDARD.encode(self.auth_tag),
        }
    }
}
