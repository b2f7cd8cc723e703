//! Request/response schemas shared by the proxy routes and the upstream client.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UpstreamError;

/// Structural validation run before any upstream call.
pub trait Validate {
    /// # Errors
    /// Returns [`UpstreamError::Validation`] naming the first offending field.
    fn validate(&self) -> Result<(), UpstreamError>;
}

/// Loose email shape check; the identity API remains the authority.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

fn required(field: &'static str, value: &str) -> Result<(), UpstreamError> {
    if value.trim().is_empty() {
        return Err(UpstreamError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn email(value: &str) -> Result<(), UpstreamError> {
    required("email", value)?;
    if !valid_email(value.trim()) {
        return Err(UpstreamError::Validation("email is invalid".to_string()));
    }
    Ok(())
}

#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("email", &self.email)?;
        required("password", &self.password)
    }
}

/// Signup body as the browser sends it.
#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("name", &self.name)?;
        email(&self.email)?;
        required("password", &self.password)
    }
}

/// Signup body as the identity API expects it.
#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl From<SignupRequest> for RegisterRequest {
    fn from(request: SignupRequest) -> Self {
        Self {
            full_name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            password: request.password,
        }
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("full_name", &self.full_name)?;
        email(&self.email)?;
        required("password", &self.password)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct GoogleIdTokenRequest {
    pub id_token: String,
}

impl Validate for GoogleIdTokenRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("id_token", &self.id_token)
    }
}

/// Authorization code from the Google popup flow.
#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct GoogleCodeRequest {
    pub code: String,
}

impl Validate for GoogleCodeRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("code", &self.code)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("current_password", &self.current_password)?;
        required("new_password", &self.new_password)
    }
}

/// Body of forgot-password and resend-verification.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug)]
pub struct EmailRequest {
    pub email: String,
}

impl Validate for EmailRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        email(&self.email)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct VerificationConfirmRequest {
    pub token: String,
}

impl Validate for VerificationConfirmRequest {
    fn validate(&self) -> Result<(), UpstreamError> {
        required("token", &self.token)
    }
}

/// Normalized success shape of every token-issuing exchange.
#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct AccessTokenBody {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct OkBody {
    pub ok: bool,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Debug for GoogleIdTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleIdTokenRequest")
            .field("id_token", &"***")
            .finish()
    }
}

impl fmt::Debug for GoogleCodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCodeRequest")
            .field("code", &"***")
            .finish()
    }
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("current_password", &"***")
            .field("new_password", &"***")
            .finish()
    }
}

impl fmt::Debug for VerificationConfirmRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationConfirmRequest")
            .field("token", &"***")
            .finish()
    }
}

impl fmt::Debug for AccessTokenBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenBody")
            .field("access_token", &"***")
            .finish()
    }
}
