//! Protocol constants shared by both peers.
//!
//! Every value here is part of the wire contract. Changing one breaks
//! interoperability with deployed peers.

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes (128 bits).
pub const TAG_LENGTH: usize = 16;

/// Wire name of the nonce field.
pub const FIELD_NONCE: &str = "nonce";

/// Wire name of the ciphertext field.
pub const FIELD_CIPHER_TEXT: &str = "cipherText";

/// Wire name of the authentication tag field.
pub const FIELD_AUTH_TAG: &str = "authTag";
