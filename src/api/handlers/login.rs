use std::sync::Arc;

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{Json, Response},
};
use serde_json::Value;
use tracing::{debug, error};

use super::{passthrough, require, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    upstream::{
        types::{AccessTokenBody, LoginRequest},
        Forwarded, UpstreamError,
    },
};

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; upstream body with access token", body = AccessTokenBody),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Email not verified", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<LoginRequest>(payload)?;

    let upstream = state
        .upstream
        .login(&request, &Forwarded::from_inbound(&headers))
        .await
        .map_err(|err| {
            debug!("login failed: {err}");
            translate(err, Operation::Login)
        })?;

    if upstream.body.parse::<AccessTokenBody>().is_none() {
        error!("login succeeded upstream without an access token");
        return Err(translate(
            UpstreamError::Malformed("missing access_token".to_string()),
            Operation::Login,
        ));
    }

    Ok(passthrough(upstream))
}
