use reqwest::StatusCode;
use thiserror::Error;

use super::{body::UpstreamBody, EMAIL_NOT_VERIFIED, EMAIL_UNVERIFIED};

/// Outcome of a failed upstream operation.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Request payload is malformed; nothing was sent upstream.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Upstream base URL is missing from the deployment configuration.
    #[error("upstream base URL is not configured")]
    Configuration,
    #[error("upstream request timed out")]
    Timeout,
    /// Connection-level failure (DNS, refused, reset).
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    /// Upstream answered 401.
    #[error("invalid credentials")]
    InvalidCredentials { message: Option<String> },
    /// Upstream answered 403 with an unverified-email reason.
    #[error("email not verified: {email}")]
    EmailUnverified { email: String },
    /// Upstream answered 409.
    #[error("account already registered")]
    AlreadyRegistered { message: Option<String> },
    /// Any other non-2xx answer.
    #[error("upstream responded with {status}")]
    Rejected {
        status: StatusCode,
        body: UpstreamBody,
    },
    /// 2xx answer whose body does not match the expected schema.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Classify a non-2xx upstream answer.
    ///
    /// `email` is the address the request was made for; only requests that carry
    /// one can be classified as [`UpstreamError::EmailUnverified`].
    #[must_use]
    pub fn classify(status: StatusCode, body: UpstreamBody, email: Option<&str>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::InvalidCredentials {
                message: body.message().map(str::to_string),
            },
            StatusCode::FORBIDDEN if is_unverified(&body) && email.is_some() => {
                Self::EmailUnverified {
                    email: email.map(str::to_string).unwrap_or_default(),
                }
            }
            StatusCode::CONFLICT => Self::AlreadyRegistered {
                message: body.message().map(str::to_string),
            },
            _ => Self::Rejected { status, body },
        }
    }

    /// Upstream status when the upstream actually answered.
    #[must_use]
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Self::InvalidCredentials { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::EmailUnverified { .. } => Some(StatusCode::FORBIDDEN),
            Self::AlreadyRegistered { .. } => Some(StatusCode::CONFLICT),
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

fn is_unverified(body: &UpstreamBody) -> bool {
    body.message()
        .is_some_and(|reason| reason == EMAIL_UNVERIFIED || reason == EMAIL_NOT_VERIFIED)
}
