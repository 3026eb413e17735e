use crate::{
    cli::{
        commands::{google, htpasswd, ldap, session},
        telemetry,
    },
    gate::{self, Gate, Provider, ReverseProxy, SessionCodec},
    providers::{
        google::GoogleProvider, htpasswd::HtpasswdProvider, ldap::LdapProvider, outbound_client,
    },
};
use anyhow::{Context, Result};
use base64ct::{Base64Url, Encoding};
use rand::RngCore;
use secrecy::SecretString;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub listen: SocketAddr,
    pub upstream: Url,
    /// Provider names in registration order.
    pub providers: Vec<String>,
    pub outbound_timeout: Duration,
    pub session: session::Options,
    pub htpasswd: htpasswd::Options,
    pub ldap: ldap::Options,
    pub google: google::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a provider cannot be registered or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let options = ProviderOptions {
        session: args.session,
        htpasswd: args.htpasswd,
        ldap: args.ldap,
        google: args.google,
    };
    let gate = build_gate(args.upstream, &args.providers, args.outbound_timeout, options)?;

    let result = gate::new(args.listen, Arc::new(gate)).await;
    telemetry::shutdown_tracer();
    result
}

struct ProviderOptions {
    session: session::Options,
    htpasswd: htpasswd::Options,
    ldap: ldap::Options,
    google: google::Options,
}

fn build_gate(
    upstream: Url,
    names: &[String],
    outbound_timeout: Duration,
    options: ProviderOptions,
) -> Result<Gate> {
    let codec = Arc::new(session_codec(options.session));
    let upstream = ReverseProxy::new(upstream).context("Failed to build upstream client")?;
    let client = outbound_client(outbound_timeout).context("Failed to build outbound client")?;

    let mut providers: Vec<Box<dyn Provider>> = Vec::with_capacity(names.len());
    for name in names {
        let provider: Box<dyn Provider> = match name.as_str() {
            "htpasswd" => Box::new(HtpasswdProvider::new(options.htpasswd.clone().into())),
            "ldap" => Box::new(LdapProvider::new(
                options.ldap.clone().into(),
                outbound_timeout,
            )),
            "google" => Box::new(GoogleProvider::new(
                options.google.clone().into(),
                client.clone(),
            )),
            other => anyhow::bail!("unknown provider: {other}"),
        };
        providers.push(provider);
    }

    let mut gate = Gate::new(codec, Arc::new(upstream));
    gate.register(providers)
        .context("Failed to register providers")?;
    Ok(gate)
}

fn session_codec(options: session::Options) -> SessionCodec {
    let secret = options.secret.unwrap_or_else(|| {
        warn!("No cookie secret configured, sessions will not survive a restart");
        random_secret()
    });
    SessionCodec::new(options.name, secret, options.expiry_hours)
}

fn random_secret() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretString::from(Base64Url::encode_string(&bytes))
}

fn log_startup_args(args: &Args) {
    info!(
        listen = %args.listen,
        upstream = %args.upstream,
        providers = ?args.providers,
        cookie_name = %args.session.name,
        cookie_expiry_hours = args.session.expiry_hours,
        "Starting wicket {} ({})",
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
}
