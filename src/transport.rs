//! The HTTP capability the client is built on.
//!
//! [`ReqwestTransport`] is the production implementation; tests and embedders can
//! supply their own [`Transport`] to run without network access.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Method;
use reqwest::header::HeaderMap;

use crate::error::GitterError;

/// Body of a streaming response, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, GitterError>>;

/// A fully-described outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response whose body is still arriving.
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the rest of the body into memory.
    pub async fn collect(self) -> Result<Bytes, GitterError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform a request and buffer the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitterError>;

    /// Perform a request and hand back the body as it arrives.
    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse, GitterError>;
}

/// [`Transport`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    /// Separate client without a total timeout, which would cut long-lived streams.
    stream_http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Option<Duration>) -> Result<Self, GitterError> {
        let user_agent = concat!("gitter-rs/", env!("CARGO_PKG_VERSION"));
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let stream_http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { http, stream_http })
    }

    fn build(&self, client: &reqwest::Client, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(request.method, &request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitterError> {
        let resp = self.build(&self.http, request).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok(HttpResponse { status, body })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse, GitterError> {
        let resp = self.build(&self.stream_http, request).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes_stream().map_err(GitterError::from).boxed();
        Ok(StreamResponse { status, body })
    }
}
