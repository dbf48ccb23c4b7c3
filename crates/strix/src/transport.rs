//! 📡 Transport: the one door between strix and the search service.
//!
//! 🚪 Everything that leaves this process leaves through [`Transport::send`].
//! It takes a method, a URL, a region and a body, and it ALWAYS comes back with a
//! [`TransportResult`]. Network down? Credentials expired? DNS on vacation?
//! You get `status: -1` and a message. You never get a panic and you never get an `Err`.
//! Retrying is somebody else's hobby. 🦆
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls ([`HttpTransport`], [`InMemoryTransport`])
//! - The transport is a constructed dependency, handed to `IndexBuffer::flush` by reference.
//! - Buffers render payloads, transports ship them. Nobody does both.

use async_trait::async_trait;
pub use reqwest::Method;
use serde::Serialize;

pub mod http;
pub mod in_mem;

pub use http::{HttpTransport, ServiceConfig};
pub use in_mem::{InMemoryTransport, SentRequest};

/// 📬 What came back from one request. Status `-1` means "never got an answer".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportResult {
    /// 🚦 HTTP status, or `-1` for transport-level failure.
    pub status: i32,
    /// 📜 Response body, or the failure message when `status == -1`.
    pub body: String,
    /// ⏱️ Wall time of the request in seconds. `-1.0` when it never happened.
    pub elapsed: f64,
    /// 📦 Bytes sent. `-1` when it never happened.
    pub size: i64,
}

impl TransportResult {
    /// 💀 The shape of "the request did not make it".
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: -1,
            body: message.into(),
            elapsed: -1.0,
            size: -1,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == -1
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 🚪 Send an authenticated request, get back status/body/timing. Never fails.
///
/// # Contract 📜
/// - A non-empty body without a trailing `\n` gets one appended before sending.
/// - Transport and auth failures become [`TransportResult::failed`].
/// - `region` is the service region the request is scoped to.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    async fn send(&self, method: Method, url: &str, region: &str, body: String) -> TransportResult;
}

/// 🧵 Bulk bodies must end in a newline. Empty stays empty.
pub(crate) fn terminate_body(mut body: String) -> String {
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body
}
