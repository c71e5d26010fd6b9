//! Request/response exchange built on the envelope codec.
//!
//! A client-side exchange walks a fixed state machine:
//!
//! ```text
//! Idle ─► Sealing ─► AwaitingResponse ─► Opening ─► Succeeded
//!            │              │                │
//!            └──────────────┴────────────────┴─────► Failed
//! ```
//!
//! [`Exchange::run`] consumes the exchange, so its outcome is delivered
//! exactly once as a single `Result`. The network step is the only
//! suspension point and is delegated to a [`Transport`]; retries and
//! timeouts belong to the transport.
//!
//! The server side is stateless: [`respond_to`] opens the inbound envelope,
//! hands the plaintext to a [`Responder`] and seals the answer under a fresh
//! nonce.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::EnvelopeCodec;
use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Envelope>> + Send + 'a>>;

/// Carries a request envelope to the peer and returns the peer's reply.
///
/// Implementations report network failures, non-success statuses and empty
/// bodies as [`ProtocolError::Transport`].
pub trait Transport: Send + Sync {
    /// Submits `request` and resolves once the reply envelope arrives.
    fn send(&self, request: Envelope) -> TransportFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: Envelope) -> TransportFuture<'_> {
        (**self).send(request)
    }
}

/// Business logic mapping a request plaintext to a response plaintext.
pub trait Responder: Send + Sync {
    /// Produces the response for one recovered request.
    fn respond(&self, request: &[u8]) -> Vec<u8>;
}

impl<F> Responder for F
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    fn respond(&self, request: &[u8]) -> Vec<u8> {
        self(request)
    }
}

/// State of a single client-side exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// Created, nothing sent yet.
    Idle,
    /// Sealing the request plaintext.
    Sealing,
    /// Request handed to the transport, waiting for the reply.
    AwaitingResponse,
    /// Opening the reply envelope.
    Opening,
    /// Reply opened; plaintext delivered.
    Succeeded,
    /// Exchange failed; error delivered.
    Failed,
}

impl ExchangeState {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Succeeded | ExchangeState::Failed)
    }

    /// Returns true if the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: ExchangeState) -> bool {
        use ExchangeState::*;
        matches!(
            (self, next),
            (Idle, Sealing)
                | (Sealing, AwaitingResponse)
                | (Sealing, Failed)
                | (AwaitingResponse, Opening)
                | (AwaitingResponse, Failed)
                | (Opening, Succeeded)
                | (Opening, Failed)
        )
    }
}

type Observer = Box<dyn Fn(ExchangeState) + Send + Sync>;

/// One client-side request/response cycle.
pub struct Exchange<T: Transport> {
    codec: Arc<EnvelopeCodec>,
    transport: T,
    state: ExchangeState,
    observer: Option<Observer>,
}

impl<T: Transport> Exchange<T> {
    /// Creates an idle exchange.
    pub fn new(codec: Arc<EnvelopeCodec>, transport: T) -> Self {
        Self {
            codec,
            transport,
            state: ExchangeState::Idle,
            observer: None,
        }
    }

    /// Installs a callback invoked on every state transition.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(ExchangeState) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Runs the exchange to completion.
    ///
    /// Returns the peer's response plaintext, or the error that moved the
    /// exchange to `Failed`.
    pub async fn run(mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.transition(ExchangeState::Sealing);
        let request = match self.codec.seal(plaintext) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(e),
        };

        self.transition(ExchangeState::AwaitingResponse);
        let response = match self.transport.send(request).await {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(e),
        };

        self.transition(ExchangeState::Opening);
        match self.codec.open(&response) {
            Ok(plaintext) => {
                self.transition(ExchangeState::Succeeded);
                Ok(plaintext)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: ProtocolError) -> Result<Vec<u8>> {
        warn!(state = ?self.state, kind = %error.kind(), "exchange failed: {}", error);
        self.transition(ExchangeState::Failed);
        Err(error)
    }

    fn transition(&mut self, next: ExchangeState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal exchange transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(next);
        }
    }
}

/// Reusable client that starts one [`Exchange`] per request.
///
/// Concurrent requests are independent; each gets its own nonce and state.
pub struct Client<T: Transport> {
    codec: Arc<EnvelopeCodec>,
    transport: Arc<T>,
}

impl<T: Transport> Client<T> {
    /// Creates a client from a shared codec and a transport.
    pub fn new(codec: Arc<EnvelopeCodec>, transport: T) -> Self {
        Self {
            codec,
            transport: Arc::new(transport),
        }
    }

    /// Creates a fresh idle exchange bound to this client's transport.
    pub fn exchange(&self) -> Exchange<Arc<T>> {
        Exchange::new(Arc::clone(&self.codec), Arc::clone(&self.transport))
    }

    /// Seals `plaintext`, sends it and opens the reply.
    pub async fn request(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.exchange().run(plaintext).await
    }

    /// Returns the codec used by this client.
    pub fn codec(&self) -> &Arc<EnvelopeCodec> {
        &self.codec
    }
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            transport: Arc::clone(&self.transport),
        }
    }
}

/// Handles one inbound request envelope on the server side.
///
/// Opens `request`, passes the plaintext to `responder` and seals the
/// response with a new nonce. Any open failure is returned unchanged so the
/// caller can answer with a client-error status.
pub fn respond_to<R: Responder + ?Sized>(
    codec: &EnvelopeCodec,
    responder: &R,
    request: &Envelope,
) -> Result<Envelope> {
    let plaintext = codec.open(request)?;
    let response = responder.respond(&plaintext);
    codec.seal(&response)
}
