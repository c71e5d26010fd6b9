//! HTTP server that answers sealed envelopes.
//!
//! The server exposes a single `POST` endpoint. Each request body must be an
//! envelope sealed under the shared key; the recovered plaintext goes to the
//! configured [`Responder`] and the answer is sealed under a fresh nonce.
//!
//! Every failure, from an unreadable body to a tag mismatch, is answered
//! with the same `400` body so that a caller learns nothing about which
//! check rejected the request.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use protocol::{respond_to, Envelope, EnvelopeCodec, ProtocolError, Responder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Error string returned for every rejected request.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request or decryption failed";

/// JSON body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    fn invalid_request() -> Self {
        Self {
            error: INVALID_REQUEST_MESSAGE.to_string(),
        }
    }
}

/// State shared by all request handlers.
#[derive(Clone)]
struct AppState {
    codec: Arc<EnvelopeCodec>,
    responder: Arc<dyn Responder>,
}

/// Build the router serving `endpoint` and `/health`.
pub fn build_router(
    config: &ServerConfig,
    codec: Arc<EnvelopeCodec>,
    responder: Arc<dyn Responder>,
) -> Router {
    let state = AppState { codec, responder };

    Router::new()
        .route(&config.endpoint, post(handle_envelope))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An HTTP server bound to a local address, ready to serve.
pub struct EnvelopeServer {
    listener: TcpListener,
    router: Router,
}

impl EnvelopeServer {
    /// Bind the server to `config.bind_addr`.
    ///
    /// Port `0` picks an ephemeral port; use [`EnvelopeServer::local_addr`]
    /// to find out which.
    pub async fn bind(
        config: &ServerConfig,
        codec: Arc<EnvelopeCodec>,
        responder: Arc<dyn Responder>,
    ) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

        Ok(Self {
            listener,
            router: build_router(config, codec, responder),
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until `shutdown` is cancelled.
    ///
    /// In-flight requests are allowed to finish before this returns.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Starting HTTP server");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Handle one sealed request.
async fn handle_envelope(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let result = body
        .map_err(|e| ProtocolError::MalformedEnvelope(e.body_text()))
        .and_then(|bytes| {
            serde_json::from_slice::<Envelope>(&bytes).map_err(ProtocolError::from)
        })
        .and_then(|request| respond_to(&state.codec, state.responder.as_ref(), &request));

    match result {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => {
            warn!(kind = %e.kind(), "Rejected request: {}", e);
            (StatusCode::BAD_REQUEST, Json(ErrorBody::invalid_request())).into_response()
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
