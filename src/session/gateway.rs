//! Client calls from the session layer to the proxy routes.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use reqwest::{header::AUTHORIZATION, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use super::identity::Profile;
use crate::{
    api::{
        error::ErrorBody,
        handlers::{TOKEN_EXPIRED, TOKEN_INVALID},
    },
    upstream::{
        types::{AccessTokenBody, OkBody},
        UpstreamBody, EMAIL_UNVERIFIED,
    },
    APP_USER_AGENT,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 20;

/// A failed proxy call, in the client-facing error shape.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GatewayError {
    /// `None` when the proxy never answered.
    pub status: Option<u16>,
    pub message: String,
    pub code: Option<String>,
    pub email: Option<String>,
}

impl GatewayError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            code: None,
            email: None,
        }
    }

    /// The account exists but its email is not verified; `email` is set.
    #[must_use]
    pub fn is_unverified(&self) -> bool {
        self.code.as_deref() == Some(EMAIL_UNVERIFIED)
    }

    /// Verification failed in a way a fresh link fixes.
    #[must_use]
    pub fn offers_new_link(&self) -> bool {
        matches!(self.code.as_deref(), Some(TOKEN_EXPIRED | TOKEN_INVALID))
    }

    fn from_response(status: StatusCode, body: &UpstreamBody) -> Self {
        match body.parse::<ErrorBody>() {
            Some(error) => Self {
                status: Some(status.as_u16()),
                message: error.message,
                code: error.code,
                email: error.email,
            },
            None => Self {
                status: Some(status.as_u16()),
                message: body
                    .message()
                    .map_or_else(|| format!("Request failed ({})", status.as_u16()), str::to_string),
                code: None,
                email: None,
            },
        }
    }
}

/// Operations the session context needs from the proxy.
pub trait AuthGateway: Send + Sync + 'static {
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AccessTokenBody, GatewayError>> + Send;

    fn exchange_google_id_token(
        &self,
        id_token: &str,
    ) -> impl Future<Output = Result<AccessTokenBody, GatewayError>> + Send;

    fn exchange_google_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<AccessTokenBody, GatewayError>> + Send;

    fn fetch_profile(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Profile, GatewayError>> + Send;

    fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Value, GatewayError>> + Send;

    fn verify_email(&self, token: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// `Ok(true)` when the proxy reports the email was dispatched.
    fn resend_verification(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    fn change_password(
        &self,
        token: &SecretString,
        current_password: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// [`AuthGateway`] over HTTP against a running proxy.
#[derive(Clone, Debug)]
pub struct HttpAuthGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthGateway {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        url::Url::parse(base_url).with_context(|| format!("invalid proxy URL: {base_url}"))?;
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .context("failed to build proxy HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, UpstreamBody), GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::transport(format!("Failed to reach proxy: {err}")))?;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response
            .bytes()
            .await
            .map_err(|err| GatewayError::transport(format!("Failed to read response: {err}")))?;
        let body = UpstreamBody::decode(&headers, &raw);
        if status.is_success() {
            Ok((status, body))
        } else {
            debug!("proxy answered {status}");
            Err(GatewayError::from_response(status, &body))
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&SecretString>,
    ) -> Result<(StatusCode, UpstreamBody), GatewayError> {
        let mut request = self
            .http
            .post(format!("{}/api/auth{path}", self.base_url))
            .json(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }
        self.call(request).await
    }

    async fn post_for<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let (status, body) = self.post(path, body, None).await?;
        body.parse().ok_or_else(|| GatewayError {
            status: Some(status.as_u16()),
            message: "Unexpected response from proxy".to_string(),
            code: None,
            email: None,
        })
    }
}

impl AuthGateway for HttpAuthGateway {
    async fn login(&self, email: &str, password: &str) -> Result<AccessTokenBody, GatewayError> {
        self.post_for("/login", &json!({ "email": email, "password": password }))
            .await
    }

    async fn exchange_google_id_token(&self, id_token: &str) -> Result<AccessTokenBody, GatewayError> {
        self.post_for("/callback/google", &json!({ "id_token": id_token }))
            .await
    }

    async fn exchange_google_code(&self, code: &str) -> Result<AccessTokenBody, GatewayError> {
        self.post_for("/callback/google-oauth", &json!({ "code": code }))
            .await
    }

    async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, GatewayError> {
        let request = self
            .http
            .get(format!("{}/api/auth/me", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        let (status, body) = self.call(request).await?;
        body.parse().ok_or_else(|| GatewayError {
            status: Some(status.as_u16()),
            message: "Failed to load profile".to_string(),
            code: None,
            email: None,
        })
    }

    async fn signup(&self, name: &str, email: &str, password: &str) -> Result<Value, GatewayError> {
        let (_, body) = self
            .post(
                "/signup",
                &json!({ "name": name, "email": email, "password": password }),
                None,
            )
            .await?;
        Ok(body.into_json())
    }

    async fn verify_email(&self, token: &str) -> Result<(), GatewayError> {
        self.post("/verify-email", &json!({ "token": token }), None)
            .await
            .map(|_| ())
    }

    async fn resend_verification(&self, email: &str) -> Result<bool, GatewayError> {
        let answer: OkBody = self
            .post_for("/resend-verification", &json!({ "email": email }))
            .await?;
        Ok(answer.ok)
    }

    async fn change_password(
        &self,
        token: &SecretString,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            "/change-password",
            &json!({ "current_password": current_password, "new_password": new_password }),
            Some(token),
        )
        .await
        .map(|_| ())
    }
}
