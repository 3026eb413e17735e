//! Stateless signed session cookies.
//!
//! Token layout: `base64url(identity)|unix_timestamp|base64url(tag)` where
//! `tag = HMAC-SHA1(key = cookie name, secret || base64url(identity) || timestamp)`.
//! The layout and byte order are shared with every other instance using the
//! same cookie name and secret, so they must not change.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64Url, Encoding};
use cookie::Cookie;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use tracing::debug;

use super::request::RequestContext;

type HmacSha1 = Hmac<Sha1>;

const SECONDS_PER_HOUR: u64 = 60 * 60;

/// Mints and validates session tokens and attaches them to responses.
///
/// The codec holds no mutable state; a single instance is shared by the gate
/// and every provider.
#[derive(Debug)]
pub struct SessionCodec {
    name: String,
    secret: SecretString,
    expiry: Duration,
}

impl SessionCodec {
    #[must_use]
    pub fn new(name: impl Into<String>, secret: SecretString, expiry_hours: u64) -> Self {
        Self {
            name: name.into(),
            secret,
            expiry: Duration::from_secs(expiry_hours.saturating_mul(SECONDS_PER_HOUR)),
        }
    }

    /// Cookie name, also used as the HMAC key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Mint a token for `identity` issued now.
    #[must_use]
    pub fn mint(&self, identity: &str) -> String {
        self.mint_at(identity, unix_now())
    }

    pub(crate) fn mint_at(&self, identity: &str, issued_at: i64) -> String {
        let encoded = Base64Url::encode_string(identity.as_bytes());
        let timestamp = issued_at.to_string();
        let tag = self.tag(&encoded, &timestamp);
        format!("{encoded}|{timestamp}|{tag}")
    }

    /// Return the identity carried by `token` if, and only if, the token is
    /// well formed, its tag verifies and it has not expired.
    #[must_use]
    pub fn validate(&self, token: &str) -> Option<String> {
        self.validate_at(token, unix_now())
    }

    pub(crate) fn validate_at(&self, token: &str, now: i64) -> Option<String> {
        let mut fields = token.split('|');
        let (Some(encoded), Some(timestamp), Some(tag), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return None;
        };

        let tag = Base64Url::decode_vec(tag).ok()?;
        if self.mac(encoded, timestamp).verify_slice(&tag).is_err() {
            return None;
        }

        let issued_at: i64 = timestamp.parse().ok()?;
        let expiry = i64::try_from(self.expiry.as_secs()).unwrap_or(i64::MAX);
        if issued_at <= now.saturating_sub(expiry) {
            debug!("session expired, issued at {issued_at}");
            return None;
        }

        let identity = Base64Url::decode_vec(encoded).ok()?;
        String::from_utf8(identity).ok()
    }

    /// Find this codec's cookie in the request headers and validate it.
    ///
    /// The first cookie carrying the configured name wins.
    #[must_use]
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.name)
            .and_then(|cookie| self.validate(cookie.value()))
    }

    /// Append a `Set-Cookie` header carrying a fresh session for `identity`.
    ///
    /// # Errors
    /// Returns an error if the cookie cannot be encoded as a header value.
    pub fn set_cookie(
        &self,
        headers: &mut HeaderMap,
        context: &RequestContext,
        identity: &str,
    ) -> Result<(), InvalidHeaderValue> {
        let expires = OffsetDateTime::now_utc() + self.expiry;
        let value = self.cookie_header(context, self.mint(identity), expires)?;
        headers.append(SET_COOKIE, value);
        Ok(())
    }

    /// Append a `Set-Cookie` header that empties and expires the session cookie.
    ///
    /// # Errors
    /// Returns an error if the cookie cannot be encoded as a header value.
    pub fn clear_cookie(
        &self,
        headers: &mut HeaderMap,
        context: &RequestContext,
    ) -> Result<(), InvalidHeaderValue> {
        let expires = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let value = self.cookie_header(context, String::new(), expires)?;
        headers.append(SET_COOKIE, value);
        Ok(())
    }

    fn cookie_header(
        &self,
        context: &RequestContext,
        value: String,
        expires: OffsetDateTime,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut builder = Cookie::build((self.name.as_str(), value))
            .path("/")
            .expires(expires)
            .http_only(true)
            .secure(context.is_secure());
        let domain = context.domain();
        if !domain.is_empty() {
            builder = builder.domain(domain.to_string());
        }
        HeaderValue::from_str(&builder.build().to_string())
    }

    fn mac(&self, encoded_identity: &str, timestamp: &str) -> HmacSha1 {
        let mut mac = HmacSha1::new_from_slice(self.name.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(self.secret.expose_secret().as_bytes());
        mac.update(encoded_identity.as_bytes());
        mac.update(timestamp.as_bytes());
        mac
    }

    fn tag(&self, encoded_identity: &str, timestamp: &str) -> String {
        Base64Url::encode_string(&self.mac(encoded_identity, timestamp).finalize().into_bytes())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
