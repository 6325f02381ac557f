//! In-process fetcher for tests.
//!
//! Responses are matched by substring against the requested URL, first
//! registered match wins. Every request is recorded.

use crate::http::Fetch;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use tile_common::{CacheError, CacheResult};

#[derive(Debug, Clone)]
enum Canned {
    Body(Bytes),
    Status(u16),
    Timeout,
}

/// Serves canned responses and records requested URLs.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    responses: Mutex<Vec<(String, Canned)>>,
    requests: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer URLs containing `pattern` with `body`.
    pub fn respond(self, pattern: &str, body: impl Into<Bytes>) -> Self {
        self.push(pattern, Canned::Body(body.into()));
        self
    }

    /// Answer URLs containing `pattern` with an HTTP error status.
    pub fn fail(self, pattern: &str, status: u16) -> Self {
        self.push(pattern, Canned::Status(status));
        self
    }

    /// Answer URLs containing `pattern` with a timeout.
    pub fn time_out(self, pattern: &str) -> Self {
        self.push(pattern, Canned::Timeout);
        self
    }

    fn push(&self, pattern: &str, canned: Canned) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push((pattern.to_string(), canned));
        }
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests whose URL contains `pattern`.
    pub fn request_count(&self, pattern: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }
}

#[async_trait]
impl Fetch for RecordingFetcher {
    async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let canned = self.responses.lock().ok().and_then(|responses| {
            responses
                .iter()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .map(|(_, canned)| canned.clone())
        });

        match canned {
            Some(Canned::Body(body)) => Ok(body),
            Some(Canned::Status(status)) => Err(CacheError::http(url, format!("HTTP {}", status))),
            Some(Canned::Timeout) => Err(CacheError::Timeout(url.to_string())),
            None => Err(CacheError::http(url, "HTTP 404 Not Found")),
        }
    }
}
