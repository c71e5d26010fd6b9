//! # SecureComm Daemon Library
//!
//! This crate carries sealed envelopes over HTTP. It provides both sides of
//! an exchange: a server that opens requests and seals a greeting back, and
//! a client transport that posts envelopes to that server.
//!
//! ## Overview
//!
//! - **Configuration**: TOML file with environment overrides
//! - **Server**: `axum` endpoint answering sealed envelopes
//! - **Client Transport**: `reqwest` implementation of [`protocol::Transport`]
//! - **Responder**: Demo business logic returning a fixed JSON greeting
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   POST /api (Envelope JSON)   ┌──────────────────────┐
//! │  protocol::Client    │ ─────────────────────────────► │   EnvelopeServer     │
//! │   + HttpTransport    │ ◄───────────────────────────── │  respond_to + Greet  │
//! └──────────────────────┘      200 Envelope / 400       └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use daemon::{Config, EnvelopeServer, GreetingResponder};
//! use protocol::EnvelopeCodec;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let codec = Arc::new(EnvelopeCodec::new(&config.shared_key()?));
//!     let responder = Arc::new(GreetingResponder::new(config.server.response_message.clone()));
//!
//!     let server = EnvelopeServer::bind(&config.server, codec, responder).await?;
//!     server.serve(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`responder`]: Greeting business logic
//! - [`server`]: HTTP server
//! - [`transport`]: HTTP client transport

pub mod config;
pub mod responder;
pub mod server;
pub mod transport;

// Re-export protocol for convenience
pub use protocol;

pub use config::{Config, ConfigError};
pub use responder::{GreetingResponder, MessageBody};
pub use server::{build_router, EnvelopeServer, ErrorBody, INVALID_REQUEST_MESSAGE};
pub use transport::HttpTransport;
