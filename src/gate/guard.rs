use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, instrument, warn};

use super::{
    error::{AuthError, SettingsError},
    provider::{Provider, RouteTable},
    request::RequestContext,
    session::SessionCodec,
    templates,
    upstream::Upstream,
    CHALLENGE_PATH, IDENTITY_HEADER,
};

/// Per-request authorization decision.
///
/// Built once at startup with [`Gate::register`], then shared behind an `Arc`
/// without locking.
pub struct Gate {
    codec: Arc<SessionCodec>,
    routes: RouteTable,
    providers: Vec<Arc<dyn Provider>>,
    upstream: Arc<dyn Upstream>,
}

impl Gate {
    #[must_use]
    pub fn new(codec: Arc<SessionCodec>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            codec,
            routes: RouteTable::new(),
            providers: Vec::new(),
            upstream,
        }
    }

    /// Register `providers` in order.
    ///
    /// # Errors
    /// Fails on the first provider whose settings do not resolve, whose name
    /// is already taken or whose routes collide.
    pub fn register(
        &mut self,
        providers: impl IntoIterator<Item = Box<dyn Provider>>,
    ) -> Result<(), SettingsError> {
        let mut names: HashSet<String> = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect();

        for mut provider in providers {
            let name = provider.name().to_string();
            if !names.insert(name.clone()) {
                return Err(SettingsError::DuplicateProvider(name));
            }

            provider.bind_codec(Arc::clone(&self.codec));
            provider.resolve_settings()?;

            let provider: Arc<dyn Provider> = Arc::from(provider);
            Arc::clone(&provider).register_routes(&mut self.routes)?;

            info!("Registered provider {} ({})", name, provider.kind());
            self.providers.push(provider);
        }
        Ok(())
    }

    /// Registered providers in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Authorize `request`, then forward it, hand it to a provider route or
    /// answer with the login challenge.
    #[instrument(skip_all, fields(path = %request.uri().path()))]
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        // Only ever set below, after the cookie verified.
        request.headers_mut().remove(IDENTITY_HEADER);

        let path = request.uri().path().to_string();

        match self.codec.session_from_headers(request.headers()) {
            Some(identity) if path != CHALLENGE_PATH => {
                debug!("authorized {identity}");
                match HeaderValue::from_str(&identity) {
                    Ok(value) => {
                        request.headers_mut().insert(IDENTITY_HEADER, value);
                        self.upstream
                            .forward(request)
                            .await
                            .unwrap_or_else(IntoResponse::into_response)
                    }
                    Err(_) => {
                        warn!("session identity is not a valid header value");
                        self.login_challenge(&request)
                    }
                }
            }
            Some(identity) => {
                info!("logout {identity}");
                self.login_challenge(&request)
            }
            None => match self.routes.get(&path) {
                Some(handler) => handler(request).await,
                None => self.login_challenge(&request),
            },
        }
    }

    /// Clear any session and render every provider's login fragment.
    #[must_use]
    pub fn login_challenge<B>(&self, request: &Request<B>) -> Response {
        let context = RequestContext::from_request(request);

        let fragments: Vec<String> = self
            .providers
            .iter()
            .map(|provider| provider.login_fragment(&context))
            .collect();

        let mut response = (StatusCode::OK, Html(templates::login_page(&fragments))).into_response();
        if self
            .codec
            .clear_cookie(response.headers_mut(), &context)
            .is_err()
        {
            warn!("failed to clear session cookie for {}", context.domain());
        }
        response
    }
}
