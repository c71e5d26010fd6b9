//! Server-side business logic.
//!
//! The daemon ships a single responder that ignores the request content and
//! answers every authenticated request with a fixed JSON greeting.

use protocol::Responder;
use serde::{Deserialize, Serialize};

/// JSON body carried inside request and response envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Serializes the body to compact JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut object = serde_json::Map::new();
        object.insert(
            "message".to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        serde_json::Value::Object(object).to_string().into_bytes()
    }

    /// Parses a body from plaintext, returning `None` if it is not a message object.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Answers every request with `{"message": <greeting>}`.
#[derive(Debug, Clone)]
pub struct GreetingResponder {
    greeting: MessageBody,
}

impl GreetingResponder {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: MessageBody::new(greeting),
        }
    }
}

impl Responder for GreetingResponder {
    fn respond(&self, request: &[u8]) -> Vec<u8> {
        match MessageBody::from_bytes(request) {
            Some(body) => tracing::debug!("Received message: {}", body.message),
            None => tracing::debug!("Received {} byte request", request.len()),
        }
        self.greeting.to_bytes()
    }
}
