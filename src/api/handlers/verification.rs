use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
};
use serde_json::{json, Value};
use tracing::debug;

use super::{require, respond, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    upstream::{
        types::{EmailRequest, OkBody, VerificationConfirmRequest},
        Forwarded, UpstreamBody, UpstreamResponse,
    },
};

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerificationConfirmRequest,
    responses(
        (status = 200, description = "Email verified; upstream JSON with `ok: true`", body = OkBody),
        (status = 400, description = "Invalid body, or expired/invalid token (code TOKEN_EXPIRED or TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<VerificationConfirmRequest>(payload)?;

    let UpstreamResponse {
        status,
        body,
        set_cookies,
        cache_control,
    } = state
        .upstream
        .confirm_verification(&request, &Forwarded::from_inbound(&headers))
        .await
        .map_err(|err| {
            debug!("email verification failed: {err}");
            translate(err, Operation::VerifyEmail)
        })?;

    // 204 would drop the confirmation body.
    let status = if status == StatusCode::NO_CONTENT {
        StatusCode::OK
    } else {
        status
    };

    Ok(respond(
        status,
        &confirmation_body(body),
        &set_cookies,
        cache_control.as_ref(),
    ))
}

/// Upstream object with `ok: true` added when absent; anything else becomes `{ok: true}`.
fn confirmation_body(body: UpstreamBody) -> Value {
    match body {
        UpstreamBody::Json(Value::Object(mut map)) => {
            map.entry("ok").or_insert(Value::Bool(true));
            Value::Object(map)
        }
        _ => json!({ "ok": true }),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Dispatch attempted; `ok` reports whether upstream accepted it", body = OkBody),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 500, description = "Upstream not configured", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = require::<EmailRequest>(payload)?;

    if !state.upstream.config().is_configured() {
        return Err(ProxyError::ConfigurationMissing);
    }

    let outcome = state.dispatcher.run(request.email.trim().to_string()).await;
    let status = outcome
        .status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::ACCEPTED);

    Ok(respond(
        status,
        &OkBody {
            ok: outcome.is_dispatched(),
        },
        &[],
        None,
    ))
}
