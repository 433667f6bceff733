//! In-memory transport that replays queued replies
//!
//! Drives feeds without a network in tests. Every request is recorded.

use super::{BodyStream, Framing, HttpRequest, HttpResponse, HttpTransport, Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Response {
        status: u16,
        framing: Framing,
        body: Vec<Bytes>,
    },
    /// Headers arrive, then the body times out after `body`
    Stalled { framing: Framing, body: Vec<Bytes> },
    Error(ScriptedError),
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptedError {
    Timeout,
    Connect,
}

impl ScriptedReply {
    /// 200 with a `Content-Length` body
    pub fn ok_json(body: impl Into<String>) -> Self {
        let body: String = body.into();
        ScriptedReply::Response {
            status: 200,
            framing: Framing::Length(body.len()),
            body: vec![Bytes::from(body)],
        }
    }

    /// 200 with a raw chunked body, size lines included
    pub fn ok_chunked(raw: impl Into<String>) -> Self {
        let raw: String = raw.into();
        ScriptedReply::Response {
            status: 200,
            framing: Framing::Chunked,
            body: vec![Bytes::from(raw)],
        }
    }

    pub fn status(status: u16) -> Self {
        ScriptedReply::Response {
            status,
            framing: Framing::Length(0),
            body: Vec::new(),
        }
    }

    pub fn timeout() -> Self {
        ScriptedReply::Error(ScriptedError::Timeout)
    }

    pub fn refused() -> Self {
        ScriptedReply::Error(ScriptedError::Connect)
    }

    /// 200 declaring `declared` bytes that times out after sending `sent`
    pub fn stalled(declared: usize, sent: impl Into<String>) -> Self {
        ScriptedReply::Stalled {
            framing: Framing::Length(declared),
            body: vec![Bytes::from(sent.into())],
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<HttpRequest>,
}

/// Clones share one script
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.with_script(|s| s.replies.push_back(reply));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.with_script(|s| s.requests.clone())
    }

    pub fn request_count(&self) -> usize {
        self.with_script(|s| s.requests.len())
    }

    pub fn pending(&self) -> usize {
        self.with_script(|s| s.replies.len())
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }
}

struct ScriptedBody {
    pieces: VecDeque<Bytes>,
    stalls: bool,
}

#[async_trait]
impl BodyStream for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.pieces.pop_front() {
            Some(piece) => Ok(Some(piece)),
            None if self.stalls => Err(TransportError::Timeout),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let reply = self.with_script(|s| {
            s.requests.push(request);
            s.replies.pop_front()
        });

        match reply {
            Some(ScriptedReply::Response {
                status,
                framing,
                body,
            }) => Ok(HttpResponse {
                status,
                framing,
                body: Box::new(ScriptedBody {
                    pieces: body.into(),
                    stalls: false,
                }),
            }),
            Some(ScriptedReply::Stalled { framing, body }) => Ok(HttpResponse {
                status: 200,
                framing,
                body: Box::new(ScriptedBody {
                    pieces: body.into(),
                    stalls: true,
                }),
            }),
            Some(ScriptedReply::Error(ScriptedError::Timeout)) => Err(TransportError::Timeout),
            Some(ScriptedReply::Error(ScriptedError::Connect)) => {
                Err(TransportError::Request("connection refused".to_string()))
            }
            None => Err(TransportError::Request("no scripted reply".to_string())),
        }
    }
}
