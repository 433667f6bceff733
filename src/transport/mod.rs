//! Outbound HTTP plumbing shared by every feed
//!
//! There is one transport handle for the whole process and it is not safe
//! for concurrent use. [`SharedTransport`] serialises access with a bounded
//! wait: a caller that cannot get the handle in time gets
//! [`TransportError::Busy`] instead of blocking.

pub mod http;
pub mod payload;
pub mod scripted;

pub use payload::{PayloadError, read_payload};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport busy")]
    Busy,

    #[error("body read failed: {0}")]
    Body(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a JSON body
    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// How the body on the wire is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length` declared
    Length(usize),
    /// Raw chunked transfer encoding, size lines included
    Chunked,
    /// Read until the peer closes
    UntilClose,
}

/// Raw body bytes as they arrive
#[async_trait]
pub trait BodyStream: Send {
    /// Next piece of the body, `None` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

pub struct HttpResponse {
    pub status: u16,
    pub framing: Framing,
    pub body: Box<dyn BodyStream>,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Implementations bound the request with a timeout.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// The single transport handle, guarded by an async mutex
#[derive(Clone)]
pub struct SharedTransport {
    inner: Arc<Mutex<Box<dyn HttpTransport>>>,
    wait: Duration,
}

impl SharedTransport {
    pub fn new(transport: impl HttpTransport + 'static, wait: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(transport))),
            wait,
        }
    }

    /// Send and fully read the response body while holding the handle
    pub async fn exchange(&self, request: HttpRequest, capacity: usize) -> Result<Exchange> {
        let transport = tokio::time::timeout(self.wait, self.inner.lock())
            .await
            .map_err(|_| TransportError::Busy)?;

        let response = transport.send(request).await?;
        let status = response.status;
        if status != 200 {
            return Ok(Exchange {
                status,
                body: Err(PayloadError::NotRead),
            });
        }

        let mut body = response.body;
        let body = read_payload(response.framing, body.as_mut(), capacity).await;
        Ok(Exchange { status, body })
    }
}

/// Status plus the outcome of reading the body
#[derive(Debug)]
pub struct Exchange {
    pub status: u16,
    pub body: std::result::Result<Vec<u8>, PayloadError>,
}
