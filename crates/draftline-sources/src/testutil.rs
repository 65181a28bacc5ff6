//! Scripted transport for provider tests.
//!
//! [`MockTransport`] answers from a queue of canned replies, repeats
//! the last reply once the queue drains, and records every request so
//! tests can assert on urls, query strings, and auth headers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use draftline_core::error::AppError;

use crate::transport::{Transport, TransportRequest, TransportResponse};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One canned reply from a [`MockTransport`].
#[derive(Debug, Clone)]
pub enum TransportReply {
    Response(TransportResponse),
    TransportError {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },
    AuthError {
        reason: String,
    },
    RateLimited,
    Timeout,
}

impl TransportReply {
    /// A 200 carrying the given JSON body.
    pub fn json(body: &str) -> Self {
        TransportReply::Response(TransportResponse {
            status: 200,
            body: body.to_string(),
            headers: Vec::new(),
        })
    }

    fn materialize(self, source: &str) -> Result<TransportResponse, AppError> {
        match self {
            TransportReply::Response(response) => Ok(response),
            TransportReply::TransportError {
                status,
                message,
                body,
            } => Err(AppError::Transport {
                source_name: source.to_string(),
                status,
                message,
                body,
            }),
            TransportReply::AuthError { reason } => Err(AppError::Auth {
                source_name: source.to_string(),
                reason,
            }),
            TransportReply::RateLimited => Err(AppError::RateLimited {
                source_name: source.to_string(),
            }),
            TransportReply::Timeout => Err(AppError::Timeout {
                source_name: source.to_string(),
                seconds: 1,
            }),
        }
    }
}

impl From<AppError> for TransportReply {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Transport {
                status,
                message,
                body,
                ..
            } => TransportReply::TransportError {
                status,
                message,
                body,
            },
            AppError::Auth { reason, .. } => TransportReply::AuthError { reason },
            AppError::RateLimited { .. } => TransportReply::RateLimited,
            AppError::Timeout { .. } => TransportReply::Timeout,
            other => TransportReply::TransportError {
                status: None,
                message: other.to_string(),
                body: None,
            },
        }
    }
}

#[derive(Debug, Default)]
struct ReplyScript {
    queue: VecDeque<TransportReply>,
    last: Option<TransportReply>,
}

impl ReplyScript {
    fn next(&mut self) -> TransportReply {
        match self.queue.pop_front() {
            Some(reply) => {
                self.last = Some(reply.clone());
                reply
            }
            None => self.last.clone().unwrap_or(TransportReply::TransportError {
                status: None,
                message: "mock transport script exhausted".to_string(),
                body: None,
            }),
        }
    }
}

/// Scripted [`Transport`] that records every request it sees.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<ReplyScript>,
    requests: Mutex<Vec<TransportRequest>>,
    count: AtomicU32,
}

impl MockTransport {
    /// Always returns the given response.
    pub fn replying(response: TransportResponse) -> Self {
        Self::always(TransportReply::Response(response))
    }

    /// Always returns the given error.
    pub fn failing(error: AppError) -> Self {
        Self::always(error.into())
    }

    /// Always returns the given reply.
    pub fn always(reply: TransportReply) -> Self {
        Self {
            script: Mutex::new(ReplyScript {
                queue: VecDeque::new(),
                last: Some(reply),
            }),
            requests: Mutex::new(Vec::new()),
            count: AtomicU32::new(0),
        }
    }

    /// Replies in order, then repeats the final reply.
    pub fn script(replies: Vec<TransportReply>) -> Self {
        Self {
            script: Mutex::new(ReplyScript {
                queue: replies.into(),
                last: None,
            }),
            requests: Mutex::new(Vec::new()),
            count: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        lock_or_recover(&self.requests).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AppError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let source = request.source.clone();
        lock_or_recover(&self.requests).push(request);
        let reply = lock_or_recover(&self.script).next();
        reply.materialize(&source)
    }
}
