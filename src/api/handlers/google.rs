//! Google sign-in exchanges. Both flows answer with the same `{access_token}`
//! shape so the session layer treats them identically.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{Json, Response},
};
use serde_json::Value;
use tracing::{debug, error};

use super::{require, respond, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    upstream::{
        types::{AccessTokenBody, GoogleCodeRequest, GoogleIdTokenRequest},
        Forwarded, UpstreamError, UpstreamResponse,
    },
};

#[utoipa::path(
    post,
    path = "/api/auth/callback/google",
    request_body = GoogleIdTokenRequest,
    responses(
        (status = 200, description = "Exchanged", body = AccessTokenBody),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Invalid Google token", body = ErrorBody),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn id_token(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<GoogleIdTokenRequest>(payload)?;
    let result = state
        .upstream
        .google_id_token(&request, &Forwarded::from_inbound(&headers))
        .await;
    normalize(result)
}

#[utoipa::path(
    post,
    path = "/api/auth/callback/google-oauth",
    request_body = GoogleCodeRequest,
    responses(
        (status = 200, description = "Exchanged", body = AccessTokenBody),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Invalid Google token", body = ErrorBody),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn authorization_code(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<GoogleCodeRequest>(payload)?;
    let result = state
        .upstream
        .google_code(&request, &Forwarded::from_inbound(&headers))
        .await;
    normalize(result)
}

fn normalize(result: Result<UpstreamResponse, UpstreamError>) -> Result<Response, ProxyError> {
    let upstream = result.map_err(|err| {
        debug!("google exchange failed: {err}");
        translate(err, Operation::Google)
    })?;

    let Some(token) = upstream.body.parse::<AccessTokenBody>() else {
        error!("google exchange succeeded upstream without an access token");
        return Err(translate(
            UpstreamError::Malformed("missing access_token".to_string()),
            Operation::Google,
        ));
    };

    Ok(respond(
        upstream.status,
        &token,
        &upstream.set_cookies,
        upstream.cache_control.as_ref(),
    ))
}
