use std::sync::Arc;

use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{api::ProxyState, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    upstream: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Upstream identity API is configured", body = Health),
        (status = 503, description = "Upstream identity API URL is missing", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(method: Method, state: Extension<Arc<ProxyState>>) -> impl IntoResponse {
    let configured = state.upstream.config().is_configured();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upstream: if configured { "configured" } else { "missing" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(0..7).unwrap_or("");

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            debug!("X-App header: {:?}", value);
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    if configured {
        (StatusCode::OK, headers, body)
    } else {
        debug!("Upstream identity API is not configured");
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
