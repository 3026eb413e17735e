pub mod error;
pub mod guard;
pub mod provider;
pub mod request;
pub mod session;
pub mod templates;
pub mod upstream;

pub use self::error::{ApiError, AuthError, SettingsError};
pub use self::guard::Gate;
pub use self::provider::{CodecSlot, Provider, ProviderKind, RouteTable};
pub use self::request::{redirect_target, FormValues, RequestContext};
pub use self::session::SessionCodec;
pub use self::upstream::{ReverseProxy, Upstream};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Login challenge, also used as logout.
pub const CHALLENGE_PATH: &str = "/auth";

/// Carries the verified principal to the upstream.
pub const IDENTITY_HEADER: &str = "x-forwarded-email";

const REQUEST_ID: &str = "x-request-id";

/// Every path goes through the gate; there are no routes of our own.
#[must_use]
pub fn router(gate: Arc<Gate>) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(gate)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

async fn handle(State(gate): State<Arc<Gate>>, request: Request<Body>) -> Response {
    gate.handle(request).await
}

/// Serve `gate` on `listen` until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(listen: SocketAddr, gate: Arc<Gate>) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;

    info!("Listening on {}", listen);

    axum::serve(listener, router(gate).into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method();
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    // Headers stay out of the span: they carry session cookies.
    info_span!("http-request", %method, path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::HOST, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;
    use url::Url;

    #[tokio::test]
    async fn router_sends_everything_through_the_gate() -> anyhow::Result<()> {
        let codec = Arc::new(SessionCodec::new(
            "_wicket",
            SecretString::from("s3cret".to_string()),
            1,
        ));
        let upstream = Arc::new(ReverseProxy::new(Url::parse("http://127.0.0.1:9")?)?);
        let app = router(Arc::new(Gate::new(codec, upstream)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/any/path")
                    .header(HOST, "gate.example.com")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID));
        Ok(())
    }
}
