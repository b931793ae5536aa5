//! The HTTP executor capability.
//!
//! The negotiator never talks to the network directly: it hands a fully
//! described request to an [`HttpExecutor`] and gets back status, headers,
//! and body. One call is one round trip, no implicit retries. Timeouts
//! are the executor's responsibility (for [`ReqwestExecutor`], configure
//! them on the underlying [`reqwest::Client`]).

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// One HTTP request, fully described.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// One HTTP response, fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failure performing a round trip.
#[derive(Debug, thiserror::Error)]
#[error("http transport failed")]
pub struct HttpExecutorError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl HttpExecutorError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Performs a single HTTP round trip.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpExecutorError>;
}

#[async_trait]
impl<T: HttpExecutor + ?Sized> HttpExecutor for std::sync::Arc<T> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpExecutorError> {
        (**self).execute(request).await
    }
}

/// [`HttpExecutor`] backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    /// Wraps an existing client, keeping its timeout and TLS settings.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpExecutorError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(HttpExecutorError::new)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(HttpExecutorError::new)?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
