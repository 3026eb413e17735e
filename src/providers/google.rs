//! Delegated login with Google's OAuth2 authorization code flow.
//!
//! The `state` parameter carries only the post-login destination.

use axum::{body::Body, http::Request, response::Response};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::api_request;
use crate::gate::{
    provider::login_succeeded,
    redirect_target,
    request::found,
    templates::{link_fragment, LoginPartial},
    ApiError, AuthError, CodecSlot, FormValues, Provider, ProviderKind, RequestContext,
    RouteTable, SessionCodec, SettingsError,
};

pub const NAME: &str = "Google";
pub const START_PATH: &str = "/oauth2/google/start";
pub const CALLBACK_PATH: &str = "/oauth2/google/callback";

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.profile https://www.googleapis.com/auth/userinfo.email";

#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    /// Accepted email domains; empty accepts any.
    pub domains: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            domains: Vec::new(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
        }
    }
}

/// Settings after validation.
#[derive(Debug)]
struct Resolved {
    client_id: String,
    client_secret: SecretString,
    domains: Vec<String>,
    auth_url: Url,
    token_url: Url,
    userinfo_url: Url,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

#[derive(Debug)]
pub struct GoogleProvider {
    settings: Settings,
    resolved: Option<Resolved>,
    client: Client,
    codec: CodecSlot,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(settings: Settings, client: Client) -> Self {
        Self {
            settings,
            resolved: None,
            client,
            codec: CodecSlot::default(),
        }
    }

    fn resolved(&self) -> Result<&Resolved, AuthError> {
        self.resolved
            .as_ref()
            .ok_or(AuthError::Internal("provider is not registered"))
    }

    /// Whether `email` belongs to one of the accepted domains.
    fn email_allowed(domains: &[String], email: &str) -> bool {
        if domains.is_empty() {
            return true;
        }
        let email = email.to_ascii_lowercase();
        domains
            .iter()
            .any(|domain| email.ends_with(&format!("@{domain}")))
    }

    /// Authorize URL for the start leg.
    fn login_url(&self, context: &RequestContext, state: &str) -> Result<Url, AuthError> {
        let resolved = self.resolved()?;
        let mut url = resolved.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", &context.host_path(CALLBACK_PATH))
            .append_pair("prompt", "select_account")
            .append_pair("scope", SCOPES)
            .append_pair("client_id", &resolved.client_id)
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url)
    }

    /// Trade the authorization code for an access token.
    async fn redeem(&self, context: &RequestContext, code: &str) -> Result<String, ApiError> {
        let resolved = self.resolved().map_err(|_| ApiError::MissingField("settings"))?;
        let callback = context.host_path(CALLBACK_PATH);

        let request = self.client.post(resolved.token_url.clone()).form(&[
            ("redirect_uri", callback.as_str()),
            ("client_id", resolved.client_id.as_str()),
            ("client_secret", resolved.client_secret.expose_secret()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ]);

        let token: TokenResponse = api_request(request).await?;
        token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::MissingField("access_token"))
    }

    async fn user_email(&self, access_token: &str) -> Result<String, ApiError> {
        let resolved = self.resolved().map_err(|_| ApiError::MissingField("settings"))?;
        let request = self
            .client
            .get(resolved.userinfo_url.clone())
            .query(&[("access_token", access_token)]);

        let info: UserInfo = api_request(request).await?;
        info.email
            .filter(|email| !email.is_empty())
            .ok_or(ApiError::MissingField("email"))
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn start(self: Arc<Self>, request: Request<Body>) -> Result<Response, AuthError> {
        let context = RequestContext::from_request(&request);
        let form = FormValues::from_request(request).await?;
        let state = redirect_target(form.get("rd"));

        let url = self.login_url(&context, &state)?;
        Ok(found(url.as_str()))
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn callback(self: Arc<Self>, request: Request<Body>) -> Result<Response, AuthError> {
        let context = RequestContext::from_request(&request);
        let form = FormValues::from_request(request).await?;

        if let Some(error) = form.get("error") {
            return Err(AuthError::ProviderReportedError(error.to_string()));
        }
        let code = form.get("code").ok_or(AuthError::MissingCode)?;

        let access_token = self
            .redeem(&context, code)
            .await
            .map_err(AuthError::TokenExchangeFailed)?;
        let email = self
            .user_email(&access_token)
            .await
            .map_err(AuthError::UserinfoFailed)?;

        let domains = &self.resolved()?.domains;
        debug!("validating {email} against domains {domains:?}");
        if !Self::email_allowed(domains, &email) {
            warn!("{email} is not in an accepted domain");
            return Err(AuthError::DomainMismatch);
        }

        info!("authenticating {email} completed");
        login_succeeded(
            self.codec.get()?,
            &context,
            NAME,
            &email,
            &redirect_target(form.get("state")),
        )
    }
}

fn parse_endpoint(option: &'static str, value: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(value).map_err(|err| SettingsError::Invalid {
        option,
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SettingsError::Invalid {
            option,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Link
    }

    fn bind_codec(&mut self, codec: Arc<SessionCodec>) {
        self.codec.bind(codec);
    }

    fn resolve_settings(&mut self) -> Result<(), SettingsError> {
        let client_id = self
            .settings
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(SettingsError::Missing("google-client-id"))?;
        let client_secret = self
            .settings
            .client_secret
            .clone()
            .filter(|secret| !secret.expose_secret().is_empty())
            .ok_or(SettingsError::Missing("google-client-secret"))?;

        let domains = self
            .settings
            .domains
            .iter()
            .map(|domain| domain.trim().trim_start_matches('@').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();

        self.resolved = Some(Resolved {
            client_id,
            client_secret,
            domains,
            auth_url: parse_endpoint("google-auth-url", &self.settings.auth_url)?,
            token_url: parse_endpoint("google-token-url", &self.settings.token_url)?,
            userinfo_url: parse_endpoint("google-userinfo-url", &self.settings.userinfo_url)?,
        });
        Ok(())
    }

    fn register_routes(self: Arc<Self>, routes: &mut RouteTable) -> Result<(), SettingsError> {
        let provider = Arc::clone(&self);
        routes.handle_fn(START_PATH, move |request| Arc::clone(&provider).start(request))?;
        routes.handle_fn(CALLBACK_PATH, move |request| Arc::clone(&self).callback(request))
    }

    fn login_fragment(&self, context: &RequestContext) -> String {
        link_fragment(&LoginPartial {
            action: &context.host_path(START_PATH),
            redirect: context.request_uri(),
            name: NAME,
        })
    }
}
