//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::ArkError;

/// Credentials for an upstream API, sent as HTTP basic auth
#[derive(Clone)]
pub enum BasicAuth {
    /// User name and API token
    Token { user: String, token: SecretString },

    /// API key sent as the user name with an empty password
    ApiKey(SecretString),
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { user, .. } => f
                .debug_struct("Token")
                .field("user", user)
                .field("token", &"[REDACTED]")
                .finish(),
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"[REDACTED]").finish(),
        }
    }
}

/// HTTP client for upstream communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth: Option<BasicAuth>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        timeout: Duration,
        auth: Option<BasicAuth>,
    ) -> Result<Self, ArkError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`; absolute inputs pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Start a request with credentials attached
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let request = self.client.request(method, &url);
        match &self.auth {
            Some(BasicAuth::Token { user, token }) => {
                request.basic_auth(user, Some(token.expose_secret()))
            }
            Some(BasicAuth::ApiKey(key)) => request.basic_auth(key.expose_secret(), Some("")),
            None => request,
        }
    }

    /// Send a request, mapping upstream failures onto the error taxonomy
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ArkError> {
        let response = request.send().await?;
        check_status(response).await
    }

    /// Make a GET request and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ArkError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        let body = response.json().await?;
        Ok(body)
    }

    /// Make a GET request and return the body as text
    pub async fn get_text(&self, path: &str) -> Result<String, ArkError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        let body = response.text().await?;
        Ok(body)
    }
}

async fn check_status(response: Response) -> Result<Response, ArkError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let body = truncate(&body, 200);
    error!("HTTP request to {} failed: {} - {}", url, status, body);

    Err(match status {
        StatusCode::NOT_FOUND => ArkError::NotFound(format!("{} not found upstream", url)),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ArkError::Unavailable(format!("{}: {}", status, body))
        }
        s if s.is_server_error() => ArkError::Unavailable(format!("{}: {}", status, body)),
        _ => ArkError::Internal(format!("upstream returned {}: {}", status, body)),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
