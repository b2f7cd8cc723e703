//! HTTP surface: proxy routes under `/api/auth`, `/health`, `/openapi.json`.

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::{openapi, ApiDoc};

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;

use crate::upstream::{UpstreamClient, UpstreamConfig, VerificationDispatcher};
use handlers::{google, health, login, me, password, signup, verification};

/// Shared, read-only state injected into every handler.
#[derive(Debug)]
pub struct ProxyState {
    pub upstream: UpstreamClient,
    pub dispatcher: VerificationDispatcher,
}

impl ProxyState {
    #[must_use]
    pub fn new(upstream: UpstreamClient) -> Self {
        let dispatcher = VerificationDispatcher::new(upstream.clone());
        Self {
            upstream,
            dispatcher,
        }
    }
}

/// Routes without middleware or state.
pub fn router() -> Router {
    let auth = Router::new()
        .route("/login", post(login::login))
        .route("/signup", post(signup::signup))
        .route("/forgot-password", post(password::forgot_password))
        .route("/change-password", post(password::change_password))
        .route("/verify-email", post(verification::verify_email))
        .route("/resend-verification", post(verification::resend_verification))
        .route("/callback/google", post(google::id_token))
        .route("/callback/google-oauth", post(google::authorization_code))
        .route("/me", get(me::me));

    Router::new()
        .route(
            "/health",
            get(health::health)
                .head(health::health)
                .options(health::health),
        )
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .nest("/api/auth", auth)
}

/// Full application: routes, request ids, tracing, optional CORS and state.
pub fn app(state: Arc<ProxyState>, frontend_origin: Option<HeaderValue>) -> Router {
    let cors = frontend_origin.map(|origin| {
        CorsLayer::new()
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static(signup::RECAPTCHA_HEADER),
            ])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true)
    });

    router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .option_layer(cors)
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, config: UpstreamConfig, frontend_url: Option<String>) -> Result<()> {
    if !config.is_configured() {
        warn!("Upstream identity API URL is not set; proxy routes will answer 500");
    }

    let origin = frontend_url.as_deref().map(frontend_origin).transpose()?;

    let state = Arc::new(ProxyState::new(UpstreamClient::new(config)?));
    let app = app(state, origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// `scheme://host[:port]` of the front end, for CORS.
///
/// # Errors
/// Returns an error if the URL cannot be parsed or has no host.
pub fn frontend_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_url)
        .with_context(|| format!("Invalid frontend URL: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend URL must include a host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    HeaderValue::from_str(&format!("{}://{host}{port}", parsed.scheme()))
        .context("Failed to build frontend origin header")
}
