use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{GitterError, api_error};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Bearer token shared by one client's adapter and realtime sequences.
///
/// Writes replace the whole value; readers always see a complete token.
#[derive(Debug, Clone, Default)]
pub(crate) struct TokenStore(Arc<RwLock<Option<String>>>);

impl TokenStore {
    pub fn set(&self, token: &str) {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.to_string());
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Base headers for a request: JSON accept plus the bearer token once one is set.
    pub fn headers(&self) -> Result<HeaderMap, GitterError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = self.get() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| GitterError::InvalidToken(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// Request/response adapter over a [`Transport`], rooted at the REST base URL.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: TokenStore,
}

impl HttpClient {
    pub(crate) fn new(transport: Arc<dyn Transport>, base_url: &str, token: TokenStore) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<HttpRequest, GitterError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = HttpRequest::new(method, url);
        request.headers = self.token.headers()?;
        Ok(request)
    }

    fn with_json_body<B: Serialize + ?Sized>(
        mut request: HttpRequest,
        body: &B,
    ) -> Result<HttpRequest, GitterError> {
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(request)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, GitterError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let resp = self.transport.send(request).await?;
        tracing::debug!(%method, %url, status = resp.status, "gitter request");
        if !resp.is_success() {
            return Err(api_error(resp.status, &resp.body));
        }
        Ok(resp)
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, GitterError> {
        let mut request = self.request(Method::GET, path)?;
        request.query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.execute(request).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, GitterError> {
        let request = Self::with_json_body(self.request(Method::POST, path)?, body)?;
        self.execute(request).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, GitterError> {
        let request = Self::with_json_body(self.request(Method::PUT, path)?, body)?;
        self.execute(request).await
    }

    // ── Typed helpers ──

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitterError> {
        let resp = self.get(path, query).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GitterError> {
        let resp = self.post(path, body).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GitterError> {
        let resp = self.put(path, body).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }
}
