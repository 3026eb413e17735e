use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

use super::{templates, CHALLENGE_PATH};

/// Failures of a single login attempt or forwarded request.
///
/// Every variant is rendered as an error page where it happens; none of them
/// touch the session cookie.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication server offline")]
    AuthServerUnavailable,
    #[error("missing code")]
    MissingCode,
    #[error("token exchange failed")]
    TokenExchangeFailed(#[source] ApiError),
    #[error("userinfo request failed")]
    UserinfoFailed(#[source] ApiError),
    #[error("domain mismatch")]
    DomainMismatch,
    #[error("identity provider returned {0}")]
    ProviderReportedError(String),
    #[error("unreadable request")]
    BadRequest,
    #[error("upstream unreachable")]
    UpstreamUnavailable,
    #[error("{0}")]
    Internal(&'static str),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AuthServerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingCode | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::TokenExchangeFailed(_) | Self::UserinfoFailed(_) | Self::UpstreamUnavailable => {
                StatusCode::BAD_GATEWAY
            }
            Self::DomainMismatch | Self::ProviderReportedError(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::ProviderReportedError(_) => "Access Denied",
            Self::DomainMismatch => "Domain Not Allowed",
            Self::InvalidCredentials => "Login Failed",
            Self::AuthServerUnavailable | Self::UpstreamUnavailable => "Service Unavailable",
            Self::MissingCode | Self::BadRequest => "Bad Request",
            Self::TokenExchangeFailed(_) | Self::UserinfoFailed(_) | Self::Internal(_) => {
                "Internal Error"
            }
        }
    }

    /// Text shown to the user; provider-supplied detail is not echoed back.
    fn message(&self) -> String {
        match self {
            Self::ProviderReportedError(_) => "Please login".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("ErrorPage {} {}: {}", status.as_u16(), self.title(), self);

        let page = templates::error_page(self.title(), &self.message(), CHALLENGE_PATH);
        (status, Html(page)).into_response()
    }
}

/// Outbound JSON API failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api request returned non 2xx status code {0}")]
    Status(reqwest::StatusCode),
    #[error("response is missing {0}")]
    MissingField(&'static str),
}

/// Startup configuration errors. Any of these stops the process before the
/// listener is bound.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing param {0}")]
    Missing(&'static str),
    #[error("invalid param {option}: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },
    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed entry in {} at line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("provider {0} is already registered")]
    DuplicateProvider(String),
    #[error("route {0} is already registered")]
    RouteConflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body;

    #[test]
    fn statuses_are_distinct_per_failure_class() {
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::AuthServerUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AuthError::MissingCode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::DomainMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::ProviderReportedError("access_denied".to_string()).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn error_page_links_back_to_login() -> anyhow::Result<()> {
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(axum::http::header::SET_COOKIE).is_none());

        let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
        let html = String::from_utf8(bytes.to_vec())?;
        assert!(html.contains("Invalid credentials"));
        assert!(html.contains(r#"href="/auth""#));
        Ok(())
    }

    #[tokio::test]
    async fn provider_error_detail_is_not_echoed() -> anyhow::Result<()> {
        let response =
            AuthError::ProviderReportedError("<script>alert(1)</script>".to_string()).into_response();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
        let html = String::from_utf8(bytes.to_vec())?;
        assert!(html.contains("Access Denied"));
        assert!(!html.contains("<script>alert(1)</script>"));
        Ok(())
    }
}
