//! Proxy route handlers.
//!
//! Each handler validates its JSON body, forwards the caller's credential
//! headers, calls one upstream operation and relays the result. Failures are
//! translated here into [`ProxyError`] with route-specific wording.

pub mod google;
pub mod health;
pub mod login;
pub mod me;
pub mod password;
pub mod signup;
pub mod verification;

use axum::{
    http::{
        header::{CACHE_CONTROL, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::error::ProxyError;
use crate::upstream::{types::Validate, UpstreamError, UpstreamResponse};

pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub const TOKEN_INVALID: &str = "TOKEN_INVALID";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Operation {
    Login,
    Signup,
    ForgotPassword,
    Google,
    VerifyEmail,
    ChangePassword,
    Me,
}

/// Unwrap and validate an optional JSON body; anything unusable is a 400.
///
/// Only a JSON object is accepted: derived struct deserializers also take
/// arrays, which would map positional values onto fields.
pub(crate) fn require<T: DeserializeOwned + Validate>(
    payload: Option<Json<Value>>,
) -> Result<T, ProxyError> {
    let Some(Json(value @ Value::Object(_))) = payload else {
        return Err(ProxyError::InvalidBody);
    };
    let request: T = serde_json::from_value(value).map_err(|_| ProxyError::InvalidBody)?;
    request.validate().map_err(|_| ProxyError::InvalidBody)?;
    Ok(request)
}

/// Map an upstream failure to the client-facing error for `operation`.
pub(crate) fn translate(err: UpstreamError, operation: Operation) -> ProxyError {
    match err {
        UpstreamError::Validation(_) => ProxyError::InvalidBody,
        UpstreamError::Configuration => ProxyError::ConfigurationMissing,
        UpstreamError::Timeout => ProxyError::UpstreamTimeout,
        UpstreamError::Unreachable(_) => ProxyError::UpstreamUnreachable,
        UpstreamError::Malformed(_) => ProxyError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: "Malformed upstream response".to_string(),
            code: None,
        },
        UpstreamError::EmailUnverified { email } => ProxyError::EmailUnverified { email },
        // Verification reasons are mapped whatever status carries them.
        UpstreamError::InvalidCredentials { message } if operation == Operation::VerifyEmail => {
            verification_failure(StatusCode::UNAUTHORIZED, message)
        }
        UpstreamError::AlreadyRegistered { message } if operation == Operation::VerifyEmail => {
            verification_failure(StatusCode::CONFLICT, message)
        }
        UpstreamError::InvalidCredentials { message } => ProxyError::Unauthorized(match operation {
            Operation::Login => "Invalid credentials. Please try again.".to_string(),
            Operation::Google => message.unwrap_or_else(|| "Invalid Google token".to_string()),
            _ => message.unwrap_or_else(|| "Unauthorized".to_string()),
        }),
        UpstreamError::AlreadyRegistered { message } => ProxyError::AlreadyRegistered(
            message.unwrap_or_else(|| "Email already registered".to_string()),
        ),
        UpstreamError::Rejected { status, body } => {
            let upstream_message = body.message().map(str::to_string);
            match operation {
                Operation::Google if status == StatusCode::FORBIDDEN => ProxyError::Upstream {
                    status,
                    message: upstream_message.unwrap_or_else(|| "Access denied".to_string()),
                    code: None,
                },
                Operation::VerifyEmail => verification_failure(status, upstream_message),
                _ => ProxyError::Upstream {
                    status,
                    message: upstream_message
                        .unwrap_or_else(|| fallback_message(operation, status)),
                    code: None,
                },
            }
        }
    }
}

fn verification_failure(status: StatusCode, reason: Option<String>) -> ProxyError {
    let (message, code) = match reason.as_deref() {
        Some(TOKEN_EXPIRED) => (
            "Your verification link has expired. Request a new one below.".to_string(),
            Some(TOKEN_EXPIRED),
        ),
        Some(TOKEN_INVALID) => (
            "Invalid verification link. You can request a fresh one below.".to_string(),
            Some(TOKEN_INVALID),
        ),
        Some(other) => (other.to_string(), None),
        None => ("Verification failed. Please try again.".to_string(), None),
    };
    ProxyError::Upstream {
        status,
        message,
        code,
    }
}

fn fallback_message(operation: Operation, status: StatusCode) -> String {
    let code = status.as_u16();
    match operation {
        Operation::Login => format!("Login failed ({code})"),
        Operation::Signup => format!("Signup failed ({code})"),
        // Not reached: forgot_password accepts every upstream status.
        Operation::ForgotPassword => format!("Password reset failed ({code})"),
        Operation::Google => "Google sign-in failed".to_string(),
        Operation::VerifyEmail => "Verification failed. Please try again.".to_string(),
        Operation::ChangePassword => format!("Password change failed ({code})"),
        Operation::Me => format!("Profile request failed ({code})"),
    }
}

/// JSON response carrying every upstream cookie and the upstream cache policy
/// (`no-store` when upstream gave none).
pub(crate) fn respond<T: Serialize>(
    status: StatusCode,
    body: &T,
    set_cookies: &[HeaderValue],
    cache_control: Option<&HeaderValue>,
) -> Response {
    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();
    for cookie in set_cookies {
        headers.append(SET_COOKIE, cookie.clone());
    }
    headers.insert(
        CACHE_CONTROL,
        cache_control
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("no-store")),
    );
    response
}

/// Relay an upstream response as-is: status, JSON body, cookies.
pub(crate) fn passthrough(upstream: UpstreamResponse) -> Response {
    let UpstreamResponse {
        status,
        body,
        set_cookies,
        cache_control,
    } = upstream;
    respond(status, &body.into_json(), &set_cookies, cache_control.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{types::LoginRequest, UpstreamBody};
    use serde_json::json;

    fn rejected(status: StatusCode, body: serde_json::Value) -> UpstreamError {
        UpstreamError::Rejected {
            status,
            body: UpstreamBody::Json(body),
        }
    }

    #[test]
    fn require_rejects_missing_and_blank_bodies() {
        assert!(matches!(
            require::<LoginRequest>(None),
            Err(ProxyError::InvalidBody)
        ));
        let blank = Json(json!({ "email": " ", "password": "x" }));
        assert!(matches!(
            require::<LoginRequest>(Some(blank)),
            Err(ProxyError::InvalidBody)
        ));
        let request = require::<LoginRequest>(Some(Json(
            json!({ "email": "ada@firm.law", "password": "x" }),
        )));
        assert!(matches!(request, Ok(LoginRequest { ref email, .. }) if email == "ada@firm.law"));
    }

    #[test]
    fn require_rejects_non_object_bodies() {
        for body in [
            json!(["user@example.com", "hunter2"]),
            json!("user@example.com"),
            json!(42),
            json!(null),
        ] {
            assert!(
                matches!(
                    require::<LoginRequest>(Some(Json(body.clone()))),
                    Err(ProxyError::InvalidBody)
                ),
                "accepted {body}"
            );
        }
        assert!(matches!(
            require::<crate::upstream::types::VerificationConfirmRequest>(Some(Json(json!([
                "tok"
            ])))),
            Err(ProxyError::InvalidBody)
        ));
    }

    #[test]
    fn login_invalid_credentials_message() {
        let err = translate(
            UpstreamError::InvalidCredentials {
                message: Some("bad".to_string()),
            },
            Operation::Login,
        );
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Invalid credentials. Please try again.");
    }

    #[test]
    fn login_fallback_includes_status() {
        let err = translate(
            UpstreamError::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: UpstreamBody::Empty,
            },
            Operation::Login,
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Login failed (500)");
    }

    #[test]
    fn detail_wins_over_fallback() {
        let err = translate(
            rejected(StatusCode::BAD_REQUEST, json!({ "detail": "Weak password", "message": "x" })),
            Operation::Signup,
        );
        assert_eq!(err.to_string(), "Weak password");
    }

    #[test]
    fn already_registered_default_message() {
        let err = translate(
            UpstreamError::AlreadyRegistered { message: None },
            Operation::Signup,
        );
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[test]
    fn google_failures() {
        let denied = translate(rejected(StatusCode::FORBIDDEN, json!({})), Operation::Google);
        assert_eq!(denied.to_string(), "Access denied");

        let invalid = translate(
            UpstreamError::InvalidCredentials { message: None },
            Operation::Google,
        );
        assert_eq!(invalid.to_string(), "Invalid Google token");

        let other = translate(
            UpstreamError::Rejected {
                status: StatusCode::BAD_GATEWAY,
                body: UpstreamBody::Empty,
            },
            Operation::Google,
        );
        assert_eq!(other.to_string(), "Google sign-in failed");
    }

    #[test]
    fn verification_reasons_get_codes() {
        let expired = translate(
            rejected(StatusCode::BAD_REQUEST, json!({ "detail": TOKEN_EXPIRED })),
            Operation::VerifyEmail,
        );
        assert_eq!(expired.body().code.as_deref(), Some(TOKEN_EXPIRED));
        assert!(expired.to_string().contains("expired"));

        let invalid = translate(
            rejected(StatusCode::BAD_REQUEST, json!({ "detail": TOKEN_INVALID })),
            Operation::VerifyEmail,
        );
        assert_eq!(invalid.body().code.as_deref(), Some(TOKEN_INVALID));

        let generic = translate(
            UpstreamError::Rejected {
                status: StatusCode::BAD_REQUEST,
                body: UpstreamBody::Empty,
            },
            Operation::VerifyEmail,
        );
        assert_eq!(generic.to_string(), "Verification failed. Please try again.");
        assert_eq!(generic.body().code, None);
    }

    #[test]
    fn verification_reasons_mapped_under_any_status() {
        let invalid = translate(
            UpstreamError::classify(
                StatusCode::UNAUTHORIZED,
                UpstreamBody::Json(json!({ "detail": TOKEN_INVALID })),
                None,
            ),
            Operation::VerifyEmail,
        );
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.body().code.as_deref(), Some(TOKEN_INVALID));
        assert!(invalid.to_string().contains("Invalid verification link"));

        let expired = translate(
            UpstreamError::classify(
                StatusCode::CONFLICT,
                UpstreamBody::Json(json!({ "detail": TOKEN_EXPIRED })),
                None,
            ),
            Operation::VerifyEmail,
        );
        assert_eq!(expired.status(), StatusCode::CONFLICT);
        assert_eq!(expired.body().code.as_deref(), Some(TOKEN_EXPIRED));
        assert!(expired.to_string().contains("expired"));

        let bare = translate(
            UpstreamError::InvalidCredentials { message: None },
            Operation::VerifyEmail,
        );
        assert_eq!(bare.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(bare.to_string(), "Verification failed. Please try again.");
    }

    #[test]
    fn transport_failures_map_to_gateway_statuses() {
        assert_eq!(
            translate(UpstreamError::Timeout, Operation::Me).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            translate(UpstreamError::Unreachable("refused".to_string()), Operation::Me).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            translate(UpstreamError::Configuration, Operation::Me).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn respond_appends_every_cookie() {
        let cookies = [
            HeaderValue::from_static("a=1"),
            HeaderValue::from_static("b=2"),
        ];
        let response = respond(StatusCode::OK, &json!({}), &cookies, None);
        let values: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(
            response.headers().get(CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
    }
}
