//! Login by simple bind against an LDAP directory.

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, LdapResult};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::{Credentials, DEFAULT_OUTBOUND_TIMEOUT};
use crate::gate::{
    provider::login_succeeded,
    templates::{form_fragment, LoginPartial},
    AuthError, CodecSlot, FormValues, Provider, ProviderKind, RequestContext, RouteTable,
    SessionCodec, SettingsError,
};

pub const NAME: &str = "LDAP";
pub const START_PATH: &str = "/auth/ldap/start";

// RFC 4511 result codes.
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error("bind rejected: {0}")]
    Rejected(String),
}

/// Checks a username and password against a directory server.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// # Errors
    /// [`DirectoryError::Unavailable`] when the server cannot be reached,
    /// [`DirectoryError::Rejected`] for any failure once connected.
    async fn bind(&self, server: &str, username: &str, password: &str) -> Result<(), DirectoryError>;
}

/// LDAPv3 over `ldap3`; one connection per attempt.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    timeout: Duration,
}

impl LdapDirectory {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LdapDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_TIMEOUT)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn bind(&self, server: &str, username: &str, password: &str) -> Result<(), DirectoryError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, server)
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!("LDAP connection error: {err}");
            }
        });

        ldap.with_timeout(self.timeout);
        let outcome = ldap
            .simple_bind(username, password)
            .await
            .and_then(LdapResult::success)
            .map(|_| ())
            .map_err(classify);

        // The connection never outlives the attempt.
        if let Err(err) = ldap.unbind().await {
            debug!("LDAP unbind failed: {err}");
        }

        outcome
    }
}

/// Split bind failures into "the directory said no" and "the directory could
/// not answer".
fn classify(err: LdapError) -> DirectoryError {
    let unavailable = match &err {
        LdapError::LdapResult { result } => matches!(result.rc, RC_BUSY | RC_UNAVAILABLE),
        LdapError::Timeout { .. }
        | LdapError::Io { .. }
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. }
        | LdapError::EndOfStream => true,
        _ => false,
    };

    if unavailable {
        DirectoryError::Unavailable(err.to_string())
    } else {
        DirectoryError::Rejected(err.to_string())
    }
}

/// Directory settings as configured.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: Option<String>,
    /// Accepted for configuration compatibility; binds use the submitted
    /// username as is.
    pub base_dn: Option<String>,
}

pub struct LdapProvider<D = LdapDirectory> {
    settings: Settings,
    server: String,
    directory: D,
    codec: CodecSlot,
}

impl LdapProvider<LdapDirectory> {
    #[must_use]
    pub fn new(settings: Settings, timeout: Duration) -> Self {
        Self::with_directory(settings, LdapDirectory::new(timeout))
    }
}

impl<D: Directory> LdapProvider<D> {
    #[must_use]
    pub fn with_directory(settings: Settings, directory: D) -> Self {
        Self {
            settings,
            server: String::new(),
            directory,
            codec: CodecSlot::default(),
        }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn start(self: Arc<Self>, request: Request<Body>) -> Result<Response, AuthError> {
        let context = RequestContext::from_request(&request);
        let credentials = Credentials::from_form(&FormValues::from_request(request).await?);

        // An empty simple bind is an anonymous bind and would succeed.
        credentials.require_both()?;

        match self
            .directory
            .bind(&self.server, &credentials.username, &credentials.password)
            .await
        {
            Ok(()) => login_succeeded(
                self.codec.get()?,
                &context,
                NAME,
                &credentials.username,
                &credentials.redirect,
            ),
            Err(DirectoryError::Rejected(reason)) => {
                debug!("bind rejected for {}: {reason}", credentials.username);
                Err(AuthError::InvalidCredentials)
            }
            Err(DirectoryError::Unavailable(reason)) => {
                error!("LDAP server {} unavailable: {reason}", self.server);
                Err(AuthError::AuthServerUnavailable)
            }
        }
    }
}

impl<D: Directory> Provider for LdapProvider<D> {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Form
    }

    fn bind_codec(&mut self, codec: Arc<SessionCodec>) {
        self.codec.bind(codec);
    }

    fn resolve_settings(&mut self) -> Result<(), SettingsError> {
        let server = self
            .settings
            .server
            .as_deref()
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .ok_or(SettingsError::Missing("ldap-server"))?;

        let url = Url::parse(server).map_err(|err| SettingsError::Invalid {
            option: "ldap-server",
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "ldap" | "ldaps") {
            return Err(SettingsError::Invalid {
                option: "ldap-server",
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        if let Some(base_dn) = &self.settings.base_dn {
            debug!("ldap-base-dn {base_dn} is not used for binding");
        }

        self.server = server.to_string();
        Ok(())
    }

    fn register_routes(self: Arc<Self>, routes: &mut RouteTable) -> Result<(), SettingsError> {
        routes.handle_fn(START_PATH, move |request| Arc::clone(&self).start(request))
    }

    fn login_fragment(&self, context: &RequestContext) -> String {
        form_fragment(&LoginPartial {
            action: &context.host_path(START_PATH),
            redirect: context.request_uri(),
            name: NAME,
        })
    }
}
