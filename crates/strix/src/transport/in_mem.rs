//! # Previously, on Strix...
//!
//! 🎬 A bulk payload, fully rendered, ready for the world. The world, however,
//! is a `Vec` behind an `Arc<Mutex<...>>`. The payload does not know this.
//! Please don't tell it.
//!
//! [`InMemoryTransport`] records every request it is handed and answers with a
//! canned [`TransportResult`]. Great for assertions, great for trust issues,
//! great for both. No sockets, no TLS, no mortgage on the line. 🦆

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Method, Transport, TransportResult, terminate_body};

/// 📮 One request as the transport saw it, trailing newline and all.
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub region: String,
    pub body: String,
}

/// 📦 A transport that never forgets and never leaves the building.
///
/// Clone-able because tests hand one clone to the pipeline and keep the other
/// to peek inside afterwards. The `Arc` means everyone shares the same Vec.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    pub sent: Arc<Mutex<Vec<SentRequest>>>,
    reply: TransportResult,
}

impl InMemoryTransport {
    /// ✅ Answers every request with a 200 and a bulk-shaped "no errors" body.
    pub fn new() -> Self {
        Self::replying(TransportResult {
            status: 200,
            body: r#"{"took":1,"errors":false,"items":[]}"#.to_string(),
            elapsed: 0.0,
            size: 0,
        })
    }

    /// 🎭 Answers every request with `reply`. `size` is overwritten with the real body size
    /// unless the reply is a transport failure.
    pub fn replying(reply: TransportResult) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            reply,
        }
    }

    /// 💀 Pretends the network is down.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::replying(TransportResult::failed(message))
    }

    pub async fn requests(&self) -> Vec<SentRequest> {
        self.sent.lock().await.clone()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, method: Method, url: &str, region: &str, body: String) -> TransportResult {
        let body = terminate_body(body);
        let mut result = self.reply.clone();
        if !result.is_transport_failure() {
            result.size = body.len() as i64;
        }
        // 🔒 the one place two tasks could collide, if we ever had two tasks
        self.sent.lock().await.push(SentRequest {
            method,
            url: url.to_string(),
            region: region.to_string(),
            body,
        });
        result
    }
}
