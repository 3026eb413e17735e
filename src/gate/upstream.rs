use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{HeaderMap, HeaderValue, Request},
    response::Response,
};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use super::{
    error::AuthError,
    request::{RequestContext, FORWARDED_HOST, FORWARDED_PROTO},
};

/// Request bodies are buffered before forwarding.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Where authorized requests go.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward an already authorized request and return the upstream response.
    ///
    /// # Errors
    /// Returns [`AuthError::UpstreamUnavailable`] if the upstream cannot be reached.
    async fn forward(&self, request: Request<Body>) -> Result<Response, AuthError>;
}

/// Forwards requests to a single base URL.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    base: Url,
    client: Client,
}

impl ReverseProxy {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { base, client })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut target = self.base.clone();
        let base_path = self.base.path().trim_end_matches('/');
        target.set_path(&format!("{base_path}{path}"));
        target.set_query(query);
        target
    }
}

#[async_trait]
impl Upstream for ReverseProxy {
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    async fn forward(&self, request: Request<Body>) -> Result<Response, AuthError> {
        let context = RequestContext::from_request(&request);
        let target = self.target_url(request.uri().path(), request.uri().query());
        let (parts, body) = request.into_parts();

        let mut headers = forwardable(&parts.headers);
        if !headers.contains_key(FORWARDED_HOST) {
            if let Ok(value) = HeaderValue::from_str(context.host()) {
                headers.insert(FORWARDED_HOST, value);
            }
        }
        if !headers.contains_key(FORWARDED_PROTO) {
            if let Ok(value) = HeaderValue::from_str(context.proto()) {
                headers.insert(FORWARDED_PROTO, value);
            }
        }

        let body = body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|_| AuthError::BadRequest)?;

        debug!("forwarding to {target}");

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                error!("upstream request failed: {err}");
                AuthError::UpstreamUnavailable
            })?;

        let status = upstream.status();
        let headers = forwardable(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Copy of `headers` without hop-by-hop headers.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut copy = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop_header(name.as_str()) {
            copy.append(name.clone(), value.clone());
        }
    }
    copy
}

/// Headers describing a single connection, plus the ones the client
/// recomputes for the outbound request.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
