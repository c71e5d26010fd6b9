//! # SecureComm Protocol Library
//!
//! This crate implements the symmetric, authenticated envelope protocol that
//! SecureComm peers use to exchange opaque request/response payloads over an
//! untrusted transport.
//!
//! ## Overview
//!
//! - **Shared Key**: a pre-shared, immutable 256-bit key
//! - **Envelope**: the `{nonce, cipherText, authTag}` wire object
//! - **Envelope Codec**: AES-256-GCM sealing and opening with fresh random nonces
//! - **Exchange**: the client-side request/response state machine and the
//!   stateless server-side handler
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Application plaintext            │  UTF-8 JSON in practice
//! ├─────────────────────────────────────────┤
//! │           Envelope Codec                │  AES-256-GCM, 96-bit nonce
//! ├─────────────────────────────────────────┤
//! │         Envelope (JSON, base64)         │  nonce / cipherText / authTag
//! ├─────────────────────────────────────────┤
//! │         Transport (HTTP POST)           │  external collaborator
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{respond_to, Envelope, EnvelopeCodec, SharedKey};
//!
//! let key = SharedKey::generate();
//! let client = EnvelopeCodec::new(&key);
//! let server = EnvelopeCodec::new(&key);
//!
//! // Client seals a request and serializes it for the wire
//! let request = client.seal(br#"{"message":"hi"}"#).unwrap();
//! let wire = request.to_json().unwrap();
//!
//! // Server opens it, answers, and seals the answer under a new nonce
//! let inbound = Envelope::from_json(&wire).unwrap();
//! let reply = respond_to(&server, &|_: &[u8]| b"ok".to_vec(), &inbound).unwrap();
//!
//! assert_eq!(client.open(&reply).unwrap(), b"ok");
//! ```
//!
//! ## Modules
//!
//! - [`constants`]: Key, nonce and tag sizes; wire field names
//! - [`key`]: Shared key material
//! - [`envelope`]: Envelope wire format
//! - [`codec`]: Seal and open
//! - [`exchange`]: Request/response state machine, transport and responder seams
//! - [`error`]: Error types

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod key;

pub use codec::{open, seal, EnvelopeCodec};
pub use constants::{KEY_LENGTH, NONCE_LENGTH, TAG_LENGTH};
pub use envelope::{DecodedEnvelope, Envelope};
pub use error::{ErrorKind, ProtocolError, Result};
pub use exchange::{
    respond_to, Client, Exchange, ExchangeState, Responder, Transport, TransportFuture,
};
pub use key::SharedKey;
