//! Request-derived helpers shared by the gate and the providers.

use axum::{
    body::{self, Body},
    http::{
        header::{CONTENT_TYPE, HOST, LOCATION},
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use url::{form_urlencoded, Position, Url};

use super::{error::AuthError, CHALLENGE_PATH};

pub const FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const FORWARDED_HOST: &str = "x-forwarded-host";

/// Stand-in origin for resolving redirect targets.
const REDIRECT_ORIGIN: &str = "http://wicket.invalid/";

/// Form bodies are small; anything larger is rejected before parsing.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// What the gate needs to know about the inbound request after its body has
/// been consumed: the public host, the scheme seen by the client and the
/// request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    host: String,
    proto: String,
    request_uri: String,
}

impl RequestContext {
    #[must_use]
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.headers(), request.uri())
    }

    #[must_use]
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
            .unwrap_or_default();

        // Only a TLS-terminating proxy in front of us sets this; the listener
        // itself speaks plain HTTP.
        let proto = headers
            .get(FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("http")
            .to_string();

        let request_uri = uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());

        Self {
            host,
            proto,
            request_uri,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// Path and query of the original request.
    #[must_use]
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.proto == "https"
    }

    /// Cookie domain: the host without its port.
    #[must_use]
    pub fn domain(&self) -> &str {
        strip_port(&self.host)
    }

    /// `<proto>://<host>` as seen by the client.
    #[must_use]
    pub fn host_url(&self) -> String {
        format!("{}://{}", self.proto, self.host)
    }

    #[must_use]
    pub fn host_path(&self, path: &str) -> String {
        format!("{}{path}", self.host_url())
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or(host)
}

/// Resolve the post-login destination.
///
/// The candidate is resolved against a placeholder origin the way a browser
/// would; only same-origin results are kept, re-emitted as path and query, and
/// never one that leads back to the login challenge. Everything else falls
/// back to `/`.
#[must_use]
pub fn redirect_target(candidate: Option<&str>) -> String {
    candidate
        .map(str::trim)
        .filter(|target| target.starts_with('/'))
        // Browsers drop tabs and newlines before resolving, so `/\t/host` is `//host`.
        .filter(|target| !target.chars().any(|c| c.is_control() || c.is_whitespace()))
        .and_then(same_origin_path)
        .filter(|target| !target.contains(CHALLENGE_PATH))
        .unwrap_or_else(|| "/".to_string())
}

fn same_origin_path(target: &str) -> Option<String> {
    let origin = Url::parse(REDIRECT_ORIGIN).ok()?;
    let resolved = origin.join(target).ok()?;
    if resolved.origin() != origin.origin() {
        return None;
    }
    Some(resolved[Position::BeforePath..Position::AfterQuery].to_string())
}

/// `302 Found` to `location`.
#[must_use]
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => AuthError::BadRequest.into_response(),
    }
}

/// Decoded form values from an urlencoded body followed by the query string.
///
/// Body values take precedence over query values with the same key.
#[derive(Debug, Default, Clone)]
pub struct FormValues(Vec<(String, String)>);

impl FormValues {
    /// Consume the request and collect its form values.
    ///
    /// # Errors
    /// Returns [`AuthError::BadRequest`] if the body cannot be read.
    pub async fn from_request(request: Request<Body>) -> Result<Self, AuthError> {
        let (parts, body) = request.into_parts();
        let mut pairs = Vec::new();

        if is_urlencoded(&parts.headers) {
            let bytes = body::to_bytes(body, MAX_FORM_BYTES)
                .await
                .map_err(|_| AuthError::BadRequest)?;
            pairs.extend(form_urlencoded::parse(&bytes).into_owned());
        }

        if let Some(query) = parts.uri.query() {
            pairs.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
        }

        Ok(Self(pairs))
    }

    /// First value for `key`; an empty value counts as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

fn is_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(';')
                .next()
                .is_some_and(|mime| {
                    mime.trim()
                        .eq_ignore_ascii_case("application/x-www-form-urlencoded")
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(host: &str, proto: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri("/reports?year=2024").header(HOST, host);
        if let Some(proto) = proto {
            builder = builder.header(FORWARDED_PROTO, proto);
        }
        RequestContext::from_request(&builder.body(()).unwrap_or_default())
    }

    #[test]
    fn domain_strips_port() {
        assert_eq!(context("gate.example.com:4180", None).domain(), "gate.example.com");
        assert_eq!(context("gate.example.com", None).domain(), "gate.example.com");
        assert_eq!(context("[::1]:4180", None).domain(), "[::1]");
    }

    #[test]
    fn secure_only_behind_https_proxy() {
        assert!(context("gate.example.com", Some("https")).is_secure());
        assert!(!context("gate.example.com", Some("http")).is_secure());
        assert!(!context("gate.example.com", None).is_secure());
    }

    #[test]
    fn host_url_uses_forwarded_proto() {
        let ctx = context("gate.example.com:4180", Some("https"));
        assert_eq!(ctx.host_url(), "https://gate.example.com:4180");
        assert_eq!(
            ctx.host_path("/oauth2/google/callback"),
            "https://gate.example.com:4180/oauth2/google/callback"
        );
        assert_eq!(ctx.request_uri(), "/reports?year=2024");
        assert_eq!(context("gate.example.com", None).host_url(), "http://gate.example.com");
    }

    #[test]
    fn redirect_target_defaults_to_root() {
        assert_eq!(redirect_target(None), "/");
        assert_eq!(redirect_target(Some("")), "/");
        assert_eq!(redirect_target(Some("/reports?year=2024")), "/reports?year=2024");
    }

    #[test]
    fn redirect_target_never_points_at_challenge() {
        assert_eq!(redirect_target(Some("/auth")), "/");
        assert_eq!(redirect_target(Some("/auth?rd=/x")), "/");
        assert_eq!(redirect_target(Some("/auth/ldap/start")), "/");
    }

    #[test]
    fn redirect_target_rejects_other_origins() {
        assert_eq!(redirect_target(Some("https://evil.example")), "/");
        assert_eq!(redirect_target(Some("//evil.example/path")), "/");
        assert_eq!(redirect_target(Some("/\\evil.example")), "/");
        assert_eq!(redirect_target(Some("/\t/evil.example")), "/");
        assert_eq!(redirect_target(Some("/\n/evil.example")), "/");
        assert_eq!(redirect_target(Some("/\r\n/evil.example")), "/");
        assert_eq!(redirect_target(Some("/ /evil.example")), "/");
        assert_eq!(redirect_target(Some("/\t\\evil.example")), "/");
    }

    #[test]
    fn redirect_target_is_normalized_before_checks() {
        assert_eq!(redirect_target(Some("/reports/../auth")), "/");
        assert_eq!(redirect_target(Some("/a/./b?x=1#frag")), "/a/b?x=1");
        assert_eq!(redirect_target(Some("/%2F%2Fevil.example")), "/%2F%2Fevil.example");
    }

    #[tokio::test]
    async fn form_values_prefer_body_over_query() -> anyhow::Result<()> {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/htpasswd/start?rd=/from-query&extra=1")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(Body::from("username=alice&password=p%40ss&rd=%2Ffrom-body"))?;

        let form = FormValues::from_request(request).await?;
        assert_eq!(form.get("username"), Some("alice"));
        assert_eq!(form.get("password"), Some("p@ss"));
        assert_eq!(form.get("rd"), Some("/from-body"));
        assert_eq!(form.get("extra"), Some("1"));
        assert_eq!(form.get("missing"), None);
        Ok(())
    }

    #[tokio::test]
    async fn form_values_ignore_non_form_bodies() -> anyhow::Result<()> {
        let request = Request::builder()
            .method("POST")
            .uri("/oauth2/google/callback?code=abc")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"code":"other"}"#))?;

        let form = FormValues::from_request(request).await?;
        assert_eq!(form.get("code"), Some("abc"));
        Ok(())
    }

    #[test]
    fn found_sets_location() {
        let response = found("/reports");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/reports")
        );
    }
}
