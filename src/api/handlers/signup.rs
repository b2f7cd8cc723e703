use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::USER_AGENT, HeaderMap, HeaderName, HeaderValue},
    response::{Json, Response},
};
use serde_json::Value;
use tracing::debug;

use super::{passthrough, require, translate, Operation};
use crate::{
    api::{
        error::{ErrorBody, ProxyError},
        ProxyState,
    },
    upstream::{
        types::{RegisterRequest, SignupRequest},
        Forwarded,
    },
};

pub const RECAPTCHA_HEADER: &str = "x-recaptcha-token";
pub const DISPATCH_HEADER: &str = "x-verification-dispatched";

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Registered; upstream body passed through"),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 502, description = "Identity API unreachable", body = ErrorBody),
        (status = 504, description = "Identity API timeout", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    state: Extension<Arc<ProxyState>>,
    payload: Option<Json<Value>>,
) -> Result<Response, ProxyError> {
    let request = RegisterRequest::from(require::<SignupRequest>(payload)?);

    let upstream = state
        .upstream
        .register(&request, &signup_forwarded(&headers))
        .await
        .map_err(|err| {
            debug!("signup failed: {err}");
            translate(err, Operation::Signup)
        })?;

    let outcome = state.dispatcher.run(request.email.clone()).await;

    let mut response = passthrough(upstream);
    response.headers_mut().insert(
        HeaderName::from_static(DISPATCH_HEADER),
        HeaderValue::from_static(if outcome.is_dispatched() { "1" } else { "0" }),
    );

    Ok(response)
}

/// Credentials plus the CAPTCHA token and client fingerprint headers.
fn signup_forwarded(headers: &HeaderMap) -> Forwarded {
    let mut forwarded = Forwarded::from_inbound(headers);
    if let Some(token) = headers.get(RECAPTCHA_HEADER).filter(|value| !value.is_empty()) {
        forwarded = forwarded.with_header(HeaderName::from_static(RECAPTCHA_HEADER), token.clone());
    }
    if let Some(value) = headers.get("x-forwarded-for") {
        forwarded = forwarded.with_header(HeaderName::from_static("x-forwarded-for"), value.clone());
    }
    if let Some(value) = headers.get(USER_AGENT) {
        forwarded = forwarded.with_header(
            HeaderName::from_static("x-forwarded-user-agent"),
            value.clone(),
        );
    }
    forwarded
}
