// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::error::TransportError;
use crate::http::{ByteStream, HttpClient, HttpResponse};

/// Canned behaviour for one URL
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 200 with the given body
    Body(Vec<u8>),
    /// The given status with a short body
    Status(u16),
    /// 200, first chunk delivered, then the connection drops
    DropAfter(Vec<u8>),
    /// Content-Length promises more than the body delivers
    ShortBody { body: Vec<u8>, declared: u64 },
    /// The request never gets a response
    ConnectFailed,
    /// 200 with the given body, answered after a delay
    Delayed { body: Vec<u8>, delay: Duration },
    /// 200, first chunk delivered, then the server goes silent
    Stalled(Vec<u8>),
    /// The client panics while handling the request
    Panic,
}

/// In-memory HTTP client keyed by URL; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, response: MockResponse) -> Self {
        self.set(url, response);
        self
    }

    pub fn set(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Number of requests seen for a URL
    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

fn body_of(chunks: Vec<Result<Bytes, TransportError>>) -> ByteStream {
    Box::pin(futures::stream::iter(chunks))
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let response = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(MockResponse::Status(404));

        match response {
            MockResponse::Body(data) => Ok(HttpResponse {
                status: 200,
                content_length: Some(data.len() as u64),
                body: body_of(vec![Ok(Bytes::from(data))]),
            }),
            MockResponse::Status(status) => Ok(HttpResponse {
                status,
                content_length: None,
                body: body_of(vec![Ok(Bytes::from_static(b"error page"))]),
            }),
            MockResponse::DropAfter(data) => Ok(HttpResponse {
                status: 200,
                content_length: None,
                body: body_of(vec![
                    Ok(Bytes::from(data)),
                    Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ))),
                ]),
            }),
            MockResponse::ShortBody { body, declared } => Ok(HttpResponse {
                status: 200,
                content_length: Some(declared),
                body: body_of(vec![Ok(Bytes::from(body))]),
            }),
            MockResponse::Delayed { body, delay } => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status: 200,
                    content_length: Some(body.len() as u64),
                    body: body_of(vec![Ok(Bytes::from(body))]),
                })
            }
            MockResponse::Stalled(data) => Ok(HttpResponse {
                status: 200,
                content_length: None,
                body: Box::pin(
                    futures::stream::iter(vec![Ok(Bytes::from(data))])
                        .chain(futures::stream::pending()),
                ),
            }),
            MockResponse::Panic => panic!("mock client asked to panic for {url}"),
            MockResponse::ConnectFailed => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}
