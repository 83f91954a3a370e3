use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that happen before a response is received.
///
/// A non-200 response is never a transport error; it is decoded into an
/// [`ApiError`] by the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("Invalid header {0}")]
    InvalidHeader(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error body returned by the server on a failed request.
///
/// `path` is a JSON path (`$.args[2].args`) into the request that failed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {error}{}", path_suffix(.path))]
pub struct HasuraError {
    #[serde(default)]
    pub path: String,
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<serde_json::Value>,
}

fn path_suffix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" ({})", path)
    }
}

/// Application level failures: the request reached the server but did not succeed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Server(#[from] HasuraError),

    #[error("Unexpected response ({status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected result type {0}")]
    ResultType(String),
}

impl ApiError {
    /// Decode a non-200 response body into a typed error.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<HasuraError>(body) {
            Ok(error) => ApiError::Server(error),
            Err(_) => ApiError::Unexpected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// The server error body, if the response carried one.
    pub fn as_server_error(&self) -> Option<&HasuraError> {
        match self {
            ApiError::Server(error) => Some(error),
            _ => None,
        }
    }
}
