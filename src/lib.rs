//! # Wicket (authentication gateway)
//!
//! `wicket` sits in front of a single HTTP upstream. Every inbound request must
//! carry a valid signed session cookie before it is forwarded; anything else is
//! sent to a login challenge listing the configured providers.
//!
//! ## Sessions
//!
//! Sessions are stateless: the cookie value is
//! `base64url(identity)|unix_timestamp|base64url(hmac_sha1)`, so any two
//! instances sharing the cookie name and secret accept each other's cookies.
//! Nothing is stored server side; logout and expiry are the only ways a session
//! ends.
//!
//! ## Providers
//!
//! - **LDAP**: simple bind with the submitted username and password.
//! - **HTPasswd**: bcrypt or `{SHA}` hashes loaded from a file at startup.
//! - **Google**: OAuth2 authorization code flow with an optional domain allow-list.
//!
//! The verified principal is handed to the upstream in `X-Forwarded-Email`,
//! which is always stripped from inbound requests first.

pub mod cli;
pub mod gate;
pub mod providers;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
