use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{Json, Response},
};
use serde_json::Value;
use tracing::debug;

use super::{passthrough, require, respond, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    upstream::{
        types::{ChangePasswordRequest, EmailRequest, MessageBody},
        Forwarded,
    },
};

pub const RESET_REQUESTED: &str = "If the email exists, we'll send a reset link shortly.";

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Reset requested (same answer whether or not the account exists)", body = MessageBody),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 500, description = "Upstream not configured", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<EmailRequest>(payload)?;

    // Any upstream answer, including 404, gets the same response.
    let upstream = state
        .upstream
        .forgot_password(&request, &Forwarded::from_inbound(&headers))
        .await
        .map_err(|err| translate(err, Operation::ForgotPassword))?;
    debug!("password reset requested, upstream status {}", upstream.status);

    Ok(respond(
        StatusCode::ACCEPTED,
        &MessageBody {
            message: RESET_REQUESTED.to_string(),
        },
        &[],
        None,
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; upstream body passed through"),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Missing or rejected Authorization", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<ChangePasswordRequest>(payload)?;

    let authorized = headers
        .get(AUTHORIZATION)
        .is_some_and(|value| !value.as_bytes().trim_ascii().is_empty());
    if !authorized {
        return Err(ProxyError::Unauthorized("Not authenticated".to_string()));
    }

    let upstream = state
        .upstream
        .change_password(&request, &Forwarded::from_inbound(&headers))
        .await
        .map_err(|err| {
            debug!("password change failed: {err}");
            translate(err, Operation::ChangePassword)
        })?;

    Ok(passthrough(upstream))
}
