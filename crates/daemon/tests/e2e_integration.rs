//! End-to-end integration tests for SecureComm.
//!
//! These tests run a real server on an ephemeral port and talk to it through
//! the real HTTP client transport:
//! - Successful exchanges
//! - Key mismatch and tampering
//! - Malformed bodies
//! - Concurrent clients and graceful shutdown

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daemon::config::{Config, ServerConfig};
use daemon::{EnvelopeServer, ErrorBody, GreetingResponder, HttpTransport, MessageBody};
use protocol::{
    Client, Envelope, EnvelopeCodec, ErrorKind, ExchangeState, ProtocolError, SharedKey,
    Transport, TransportFuture,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A server running in the background.
struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(key: &SharedKey, response_message: &str) -> Self {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            response_message: response_message.to_string(),
            ..ServerConfig::default()
        };
        let codec = Arc::new(EnvelopeCodec::new(key));
        let responder = Arc::new(GreetingResponder::new(response_message));

        let server = EnvelopeServer::bind(&config, codec, responder).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    fn client(&self, key: &SharedKey) -> Client<HttpTransport> {
        let transport = HttpTransport::new(self.url(), Duration::from_secs(5)).unwrap();
        Client::new(Arc::new(EnvelopeCodec::new(key)), transport)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

/// Transport that flips one bit of the reply ciphertext.
struct Tampering(HttpTransport);

impl Transport for Tampering {
    fn send(&self, request: Envelope) -> TransportFuture<'_> {
        Box::pin(async move {
            let reply = self.0.send(request).await?;
            let mut decoded = reply.decode()?;
            decoded.cipher_text[0] ^= 0x01;
            Ok(decoded.encode())
        })
    }
}

fn legacy_demo_key() -> SharedKey {
    SharedKey::from_slice(b"0123456789abcdef0123456789abcdef").unwrap()
}

// =============================================================================
// Successful Exchanges
// =============================================================================

#[tokio::test]
async fn test_hello_exchange_with_zero_key() {
    let key = SharedKey::from_bytes([0u8; 32]);
    let server = TestServer::start(&key, "Hello from Node.js backend!").await;

    let reply = server.client(&key).request(b"hello").await.unwrap();
    assert_eq!(reply, br#"{"message":"Hello from Node.js backend!"}"#.to_vec());

    server.stop().await;
}

#[tokio::test]
async fn test_json_message_exchange() {
    let key = legacy_demo_key();
    let server = TestServer::start(&key, "Hello from SecureComm backend!").await;

    let request = MessageBody::new("Hello from the client!").to_bytes();
    let reply = server.client(&key).request(&request).await.unwrap();

    assert_eq!(
        MessageBody::from_bytes(&reply),
        Some(MessageBody::new("Hello from SecureComm backend!"))
    );

    server.stop().await;
}

#[tokio::test]
async fn test_exchange_walks_every_state() {
    let key = SharedKey::generate();
    let server = TestServer::start(&key, "hi").await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&states);
    let exchange = server
        .client(&key)
        .exchange()
        .with_observer(move |state| recorder.lock().unwrap().push(state));

    exchange.run(b"ping").await.unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ExchangeState::Sealing,
            ExchangeState::AwaitingResponse,
            ExchangeState::Opening,
            ExchangeState::Succeeded,
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let key = SharedKey::generate();
    let server = TestServer::start(&key, "concurrent").await;
    let client = server.client(&key);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.request(format!("req {}", i).as_bytes()).await })
        })
        .collect();

    for task in tasks {
        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply, br#"{"message":"concurrent"}"#.to_vec());
    }

    server.stop().await;
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_wrong_key_is_rejected_by_server() {
    let server = TestServer::start(&SharedKey::generate(), "x").await;

    let err = server
        .client(&SharedKey::generate())
        .request(b"hello")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err
        .to_string()
        .contains("unexpected response code: 400 (Invalid request or decryption failed)"));

    server.stop().await;
}

#[tokio::test]
async fn test_tampered_reply_fails_authentication() {
    let key = SharedKey::generate();
    let server = TestServer::start(&key, "x").await;

    let transport = Tampering(HttpTransport::new(server.url(), Duration::from_secs(5)).unwrap());
    let client = Client::new(Arc::new(EnvelopeCodec::new(&key)), transport);

    let err = client.request(b"hello").await.unwrap_err();
    assert!(matches!(err, ProtocolError::Authentication));

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_body_gets_generic_error() {
    let server = TestServer::start(&SharedKey::generate(), "x").await;

    let response = reqwest::Client::new()
        .post(server.url())
        .header("content-type", "application/json")
        .body(r#"{"nonce":"AAAAAAAAAAAAAAAA","cipherText":"","authTag":"short"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "Invalid request or decryption failed");

    server.stop().await;
}

#[tokio::test]
async fn test_server_unreachable_after_shutdown() {
    let key = SharedKey::generate();
    let server = TestServer::start(&key, "x").await;
    let client = server.client(&key);

    client.request(b"before").await.unwrap();
    server.stop().await;

    let err = client.request(b"after").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

// =============================================================================
// Configuration Wiring
// =============================================================================

#[tokio::test]
async fn test_server_and_client_from_config() {
    let key = SharedKey::generate();
    let mut config = Config::default();
    config.crypto.key = Some(key.to_base64());
    config.server.bind_addr = "127.0.0.1:0".to_string();
    config.validate().unwrap();

    let codec = Arc::new(EnvelopeCodec::new(&config.shared_key().unwrap()));
    let responder = Arc::new(GreetingResponder::new(
        config.server.response_message.clone(),
    ));
    let server = EnvelopeServer::bind(&config.server, Arc::clone(&codec), responder)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve(shutdown.clone()));

    config.client.backend_url = format!("http://{}{}", addr, config.server.endpoint);
    let client = Client::new(codec, HttpTransport::from_config(&config.client).unwrap());

    let reply = client
        .request(&MessageBody::new(config.client.request_message.clone()).to_bytes())
        .await
        .unwrap();
    assert_eq!(
        MessageBody::from_bytes(&reply).unwrap().message,
        "Hello from SecureComm backend!"
    );

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
