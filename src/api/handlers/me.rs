use std::sync::Arc;

use axum::{extract::Extension, http::HeaderMap, response::Response};
use tracing::debug;

use super::{passthrough, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    session::identity::Profile,
    upstream::Forwarded,
};

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Profile of the bearer", body = Profile),
        (status = 401, description = "Missing or rejected token", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
) -> Result<Response, ProxyError> {
    let upstream = state
        .upstream
        .me(&Forwarded::from_inbound(&headers))
        .await
        .map_err(|err| {
            debug!("profile fetch failed: {err}");
            translate(err, Operation::Me)
        })?;

    Ok(passthrough(upstream))
}
