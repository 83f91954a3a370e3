use super::error::{ApiError, TransportError};
use crate::config::ProjectConfig;
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";
pub const ACCESS_KEY_HEADER: &str = "x-hasura-access-key";

/// Status and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Turn a non-200 response into a typed [`ApiError`].
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_response(self.status, &self.body))
        }
    }

    /// Decode a 200 body, or the error body of any other status.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let response = self.error_for_status()?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends request bodies to the server.
///
/// Implementations must return `Ok` for every response the server produced,
/// whatever its status; only failures to get a response are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse, TransportError>;
}

/// POST a serializable body to `path`.
pub async fn post<T: Serialize + ?Sized>(
    transport: &dyn Transport,
    path: &str,
    body: &T,
) -> Result<RawResponse, TransportError> {
    let body = serde_json::to_value(body)?;
    transport.send(Method::POST, path, Some(&body)).await
}

/// [`Transport`] over HTTP(S) using reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Create a transport for the given endpoint with no extra headers.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        Self::build(endpoint, HeaderMap::new(), None)
    }

    /// Create a transport from the project config: admin secret (or the
    /// deprecated access key), custom headers and timeout.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();

        for (name, value) in &config.headers {
            insert_header(&mut headers, name, value)?;
        }

        match (&config.admin_secret, &config.access_key) {
            (Some(secret), _) if !secret.is_empty() => {
                insert_header(&mut headers, ADMIN_SECRET_HEADER, secret)?;
            }
            (_, Some(key)) if !key.is_empty() => {
                insert_header(&mut headers, ACCESS_KEY_HEADER, key)?;
            }
            _ => {}
        }

        Self::build(
            &config.endpoint,
            headers,
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    fn build(
        endpoint: &str,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidUrl(endpoint.to_string(), e))?;

        // Url::join replaces the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
            headers,
        })
    }

    /// Full URL for an API path such as `v1/query`.
    pub fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl(path.to_string(), e))
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), TransportError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
    headers.insert(name, value);
    Ok(())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url_for(path)?;
        debug!(%method, %url, "Sending request");

        let mut request = self
            .client
            .request(method, url)
            .headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(RawResponse { status, body })
    }
}
