//! Reverse proxy to deployed instances

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName};
use axum::response::Response;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, warn};

use crate::deploy::registry::http_url;
use crate::errors::ArkError;
use crate::storage::routes::Route;

/// Headers that describe one connection and must not be forwarded
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Proxy options
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Whole-exchange timeout for one forwarded request
    pub timeout: Duration,

    /// Largest request body accepted for forwarding
    pub max_body_bytes: usize,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Forwards requests to the service an instance registered
pub struct InstanceProxy {
    client: Client,
    options: ProxyOptions,
}

impl InstanceProxy {
    pub fn new(options: ProxyOptions) -> Result<Self, ArkError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .redirect(Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client, options })
    }

    /// Send `request` to `path` on the route's target, keeping method, headers and query
    pub async fn forward(
        &self,
        route: &Route,
        path: &str,
        request: Request,
    ) -> Result<Response, ArkError> {
        let (parts, body) = request.into_parts();

        let mut url = http_url(&route.target_host, u32::from(route.target_port));
        url.push_str(path.trim_start_matches('/'));
        if let Some(query) = parts.uri.query() {
            url.push('?');
            url.push_str(query);
        }

        let body = to_bytes(body, self.options.max_body_bytes)
            .await
            .map_err(|e| ArkError::InvalidArgument(format!("unreadable request body: {}", e)))?;

        debug!("Proxying {} {} for {}", parts.method, url, route.instance_id);
        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(end_to_end(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| unreachable_upstream(route, e))?;

        let status = upstream.status();
        let headers = end_to_end(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| unreachable_upstream(route, e))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn unreachable_upstream(route: &Route, e: reqwest::Error) -> ArkError {
    warn!(
        "Upstream {}:{} of instance {} unreachable: {}",
        route.target_host, route.target_port, route.instance_id, e
    );
    ArkError::Unavailable("upstream unreachable".to_string())
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy of `headers` without the hop-by-hop ones
fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut copied = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            copied.append(name.clone(), value.clone());
        }
    }
    copied
}
