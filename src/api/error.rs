//! Client-facing error shape shared by every proxy route.

use axum::{
    http::{header::CACHE_CONTROL, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::upstream::EMAIL_UNVERIFIED;

/// `{ message, code?, email? }`
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid body")]
    InvalidBody,
    #[error("{0}")]
    Unauthorized(String),
    #[error("Email not verified")]
    EmailUnverified { email: String },
    #[error("{0}")]
    AlreadyRegistered(String),
    #[error("Upstream timeout")]
    UpstreamTimeout,
    #[error("Failed to reach API")]
    UpstreamUnreachable,
    #[error("Server misconfigured: upstream API URL is not set")]
    ConfigurationMissing,
    /// Upstream answered with a failure; its status is passed through.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        code: Option<&'static str>,
    },
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::EmailUnverified { .. } => StatusCode::FORBIDDEN,
            Self::AlreadyRegistered(_) => StatusCode::CONFLICT,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
            Self::ConfigurationMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status, .. } => *status,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let (code, email) = match self {
            Self::EmailUnverified { email } => {
                (Some(EMAIL_UNVERIFIED.to_string()), Some(email.clone()))
            }
            Self::Upstream { code, .. } => (code.map(str::to_string), None),
            _ => (None, None),
        };
        ErrorBody {
            message: self.to_string(),
            code,
            email,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
