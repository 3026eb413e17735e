//! Credential backends registered with the gate.

pub mod google;
pub mod htpasswd;
pub mod ldap;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

use crate::gate::{redirect_target, ApiError, AuthError, FormValues};

/// Default bound on every outbound call made by a provider.
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client for calls to identity providers.
///
/// # Errors
/// Returns an error if the client cannot be built.
pub fn outbound_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Send `request`, require a 2xx answer and decode its JSON body.
///
/// # Errors
/// Returns [`ApiError::Request`] if the call or the decoding fails and
/// [`ApiError::Status`] for any non 2xx status.
pub async fn api_request<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("api request returned {}: {}", status, body);
        return Err(ApiError::Status(status));
    }

    debug!("api request returned {}", status);
    Ok(response.json::<T>().await?)
}

/// Username, password and destination posted by a login form.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub redirect: String,
}

impl Credentials {
    /// Missing fields are empty; the backend decides whether that is acceptable.
    #[must_use]
    pub fn from_form(form: &FormValues) -> Self {
        Self {
            username: form.get("username").unwrap_or_default().to_string(),
            password: form.get("password").unwrap_or_default().to_string(),
            redirect: redirect_target(form.get("rd")),
        }
    }

    /// # Errors
    /// Returns [`AuthError::InvalidCredentials`] when either field is empty.
    pub fn require_both(&self) -> Result<(), AuthError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use serde::Deserialize;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[derive(Debug, Deserialize)]
    struct Token {
        access_token: String,
    }

    #[tokio::test]
    async fn api_request_decodes_json() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "abc"})),
            )
            .mount(&server)
            .await;

        let client = outbound_client(DEFAULT_OUTBOUND_TIMEOUT)?;
        let token: Token = api_request(client.post(format!("{}/token", server.uri()))).await?;
        assert_eq!(token.access_token, "abc");
        Ok(())
    }

    #[tokio::test]
    async fn api_request_rejects_non_success() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let client = outbound_client(DEFAULT_OUTBOUND_TIMEOUT)?;
        let result: Result<Token, _> =
            api_request(client.get(format!("{}/userinfo", server.uri()))).await;
        assert!(matches!(result, Err(ApiError::Status(status)) if status.as_u16() == 401));
        Ok(())
    }

    #[tokio::test]
    async fn api_request_times_out() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = outbound_client(Duration::from_millis(200))?;
        let result: Result<Token, _> =
            api_request(client.get(format!("{}/slow", server.uri()))).await;
        assert!(matches!(result, Err(ApiError::Request(err)) if err.is_timeout()));
        Ok(())
    }

    #[tokio::test]
    async fn credentials_sanitize_redirect() -> anyhow::Result<()> {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/htpasswd/start")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("username=alice&password=&rd=%2F%2Fevil.example"))?;
        let form = FormValues::from_request(request).await?;

        let credentials = Credentials::from_form(&form);
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.redirect, "/");
        assert!(matches!(
            credentials.require_both(),
            Err(AuthError::InvalidCredentials)
        ));
        Ok(())
    }
}
