// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::TransportError;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Upper bound on the buffer reserved up front by [`HttpResponse::collect`]
const COLLECT_CAPACITY_HINT_LIMIT: u64 = 1 << 20;

/// Idle time after which a stalled response read is abandoned
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collect the whole body into memory
    pub async fn collect(self) -> Result<Bytes, TransportError> {
        // Content-Length is only a hint; a bogus value must not drive allocation
        let hint = self.content_length.unwrap_or(0).min(COLLECT_CAPACITY_HINT_LIMIT);
        let mut buf = Vec::with_capacity(hint as usize);
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request and return the status with a streaming body
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Connect timeout applied by [`ReqwestClient::new`]
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new ReqwestClient with the crate user agent, a connect timeout
    /// and a [`READ_TIMEOUT`]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|result| result.map_err(TransportError::from)),
        );

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
