//! The contract every credential backend implements, and the sub-route table
//! providers install their handlers into.

use axum::{
    body::Body,
    http::{header::LOCATION, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};
use tracing::info;

use super::{
    error::{AuthError, SettingsError},
    request::RequestContext,
    session::SessionCodec,
    CHALLENGE_PATH,
};

/// How a provider's login fragment looks on the challenge page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Username and password posted to the provider.
    Form,
    /// A button leaving for a delegated identity provider.
    Link,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential backend.
///
/// The gate drives registration exactly once per provider, in this order:
/// [`bind_codec`](Provider::bind_codec), [`resolve_settings`](Provider::resolve_settings),
/// [`register_routes`](Provider::register_routes). After that the provider is
/// shared read-only between requests.
pub trait Provider: Send + Sync {
    /// Unique registry key, also shown on the login page.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Receive the codec used to mint sessions after a successful login.
    fn bind_codec(&mut self, codec: Arc<SessionCodec>);

    /// Validate and load settings.
    ///
    /// # Errors
    /// Returns an error if a required setting is missing or unusable; the
    /// gateway does not start in that case.
    fn resolve_settings(&mut self) -> Result<(), SettingsError>;

    /// Install this provider's sub-routes.
    ///
    /// # Errors
    /// Returns [`SettingsError::RouteConflict`] if a path is already taken.
    fn register_routes(self: Arc<Self>, routes: &mut RouteTable) -> Result<(), SettingsError>;

    /// HTML fragment for the login page, carrying the current request URI as
    /// the post-login destination.
    fn login_fragment(&self, context: &RequestContext) -> String;
}

pub type RouteFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
pub type RouteHandler = Arc<dyn Fn(Request<Body>) -> RouteFuture + Send + Sync>;

/// Exact path to handler map consulted for unauthenticated requests.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, RouteHandler>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`. Failures returned by the handler are
    /// rendered as error pages.
    ///
    /// # Errors
    /// Returns [`SettingsError::RouteConflict`] if `path` is the challenge path
    /// or is already registered.
    pub fn handle_fn<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), SettingsError>
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, AuthError>> + Send + 'static,
    {
        if path == CHALLENGE_PATH || self.routes.contains_key(path) {
            return Err(SettingsError::RouteConflict(path.to_string()));
        }

        let handler: RouteHandler = Arc::new(move |request: Request<Body>| -> RouteFuture {
            let pending = handler(request);
            Box::pin(async move { pending.await.unwrap_or_else(IntoResponse::into_response) })
        });
        self.routes.insert(path.to_string(), handler);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<RouteHandler> {
        self.routes.get(path).cloned()
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("RouteTable").field("paths", &paths).finish()
    }
}

/// Holder for the codec handed over by [`Provider::bind_codec`].
#[derive(Debug, Default, Clone)]
pub struct CodecSlot(Option<Arc<SessionCodec>>);

impl CodecSlot {
    pub fn bind(&mut self, codec: Arc<SessionCodec>) {
        self.0 = Some(codec);
    }

    /// # Errors
    /// Returns [`AuthError::Internal`] if the provider was never registered.
    pub fn get(&self) -> Result<&SessionCodec, AuthError> {
        self.0
            .as_deref()
            .ok_or(AuthError::Internal("provider is not registered"))
    }
}

/// Mint a session for `identity` and send the browser on to `target`.
///
/// # Errors
/// Returns [`AuthError::Internal`] if the cookie cannot be encoded.
pub fn login_succeeded(
    codec: &SessionCodec,
    context: &RequestContext,
    provider: &str,
    identity: &str,
    target: &str,
) -> Result<Response, AuthError> {
    let location = HeaderValue::from_str(target).unwrap_or_else(|_| HeaderValue::from_static("/"));
    let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();

    codec
        .set_cookie(response.headers_mut(), context, identity)
        .map_err(|_| AuthError::Internal("session cookie is not a valid header"))?;

    info!(provider, identity, "login succeeded");
    Ok(response)
}
