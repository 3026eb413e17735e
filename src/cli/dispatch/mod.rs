//! Map parsed CLI arguments to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    google, htpasswd, ldap, session, ARG_LISTEN, ARG_OUTBOUND_TIMEOUT_SECONDS, ARG_PROVIDERS,
    ARG_UPSTREAM,
};
use anyhow::{Context, Result};
use std::{net::SocketAddr, time::Duration};
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen = matches
        .get_one::<SocketAddr>(ARG_LISTEN)
        .copied()
        .context("missing required argument: --listen")?;

    let upstream = matches
        .get_one::<String>(ARG_UPSTREAM)
        .filter(|value| !value.trim().is_empty())
        .context("missing required argument: --upstream")?;
    let upstream = Url::parse(upstream.trim()).context("invalid WICKET_UPSTREAM")?;
    if !matches!(upstream.scheme(), "http" | "https") {
        anyhow::bail!("invalid WICKET_UPSTREAM: unsupported scheme {}", upstream.scheme());
    }

    // Repeated names are kept so registration reports them.
    let providers: Vec<String> = matches
        .get_many::<String>(ARG_PROVIDERS)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if providers.is_empty() {
        anyhow::bail!("missing required argument: --{ARG_PROVIDERS}");
    }

    let outbound_timeout = Duration::from_secs(
        matches
            .get_one::<u64>(ARG_OUTBOUND_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10),
    );

    Ok(Action::Server(Args {
        listen,
        upstream,
        providers,
        outbound_timeout,
        session: session::Options::parse(matches)?,
        htpasswd: htpasswd::Options::parse(matches),
        ldap: ldap::Options::parse(matches),
        google: google::Options::parse(matches),
    }))
}
