use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{
    header::{
        HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, COOKIE,
        SET_COOKIE,
    },
    Method, StatusCode,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    body::UpstreamBody,
    error::UpstreamError,
    types::{
        ChangePasswordRequest, EmailRequest, GoogleCodeRequest, GoogleIdTokenRequest,
        LoginRequest, RegisterRequest, Validate, VerificationConfirmRequest,
    },
};
use crate::APP_USER_AGENT;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_INTERACTIVE_TIMEOUT_SECONDS: u64 = 20;
const DEFAULT_DISPATCH_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    base_url: Option<String>,
    timeout: Duration,
    interactive_timeout: Duration,
    dispatch_timeout: Duration,
}

impl UpstreamConfig {
    /// A missing base URL is accepted here and reported per request as
    /// [`UpstreamError::Configuration`].
    ///
    /// # Errors
    /// Returns an error if the base URL is present but not an absolute http(s) URL.
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let base_url = match base_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(raw) => {
                let parsed =
                    Url::parse(raw).with_context(|| format!("invalid upstream URL: {raw}"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("upstream URL must use http or https: {raw}");
                }
                Some(raw.trim_end_matches('/').to_string())
            }
            None => None,
        };

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            interactive_timeout: Duration::from_secs(DEFAULT_INTERACTIVE_TIMEOUT_SECONDS),
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECONDS),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_interactive_timeout(mut self, timeout: Duration) -> Self {
        self.interactive_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn interactive_timeout(&self) -> Duration {
        self.interactive_timeout
    }

    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }
}

/// Headers relayed from the browser request to the identity API.
#[derive(Clone, Debug, Default)]
pub struct Forwarded {
    headers: HeaderMap,
}

impl Forwarded {
    /// Copy credential material (`Authorization`, `Cookie`) verbatim.
    #[must_use]
    pub fn from_inbound(inbound: &HeaderMap) -> Self {
        let mut headers = HeaderMap::new();
        for name in [AUTHORIZATION, COOKIE] {
            for value in inbound.get_all(&name) {
                headers.append(name.clone(), value.clone());
            }
        }
        Self { headers }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(AUTHORIZATION)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// A response the identity API actually produced.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
    /// Every `Set-Cookie` value, in the order upstream sent them.
    pub set_cookies: Vec<HeaderValue>,
    pub cache_control: Option<HeaderValue>,
}

impl UpstreamResponse {
    /// # Errors
    /// Returns the classified [`UpstreamError`] for non-2xx statuses.
    pub fn ensure_success(self, email: Option<&str>) -> Result<Self, UpstreamError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(UpstreamError::classify(self.status, self.body, email))
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        request: &LoginRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/login",
            Some(request),
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(Some(request.email.trim()))
    }

    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        request: &RegisterRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/register",
            Some(request),
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(Some(request.email.as_str()))
    }

    /// Implicit flow: exchange a Google ID token.
    ///
    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn google_id_token(
        &self,
        request: &GoogleIdTokenRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/google",
            Some(request),
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(None)
    }

    /// Popup flow: exchange a Google authorization code.
    ///
    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn google_code(
        &self,
        request: &GoogleCodeRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/google/code",
            Some(request),
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(None)
    }

    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/password/change",
            Some(request),
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(None)
    }

    /// Returns whatever upstream answered, success or not; callers must not
    /// reveal whether the account exists.
    ///
    /// # Errors
    /// Only validation, configuration and transport failures.
    #[instrument(skip_all)]
    pub async fn forgot_password(
        &self,
        request: &EmailRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/password/forgot",
            Some(request),
            forwarded,
            self.config.timeout,
        )
        .await
    }

    /// Ask upstream to (re)send the verification email, bounded by the dispatch
    /// timeout. Returns whatever upstream answered.
    ///
    /// # Errors
    /// Only validation, configuration and transport failures.
    #[instrument(skip_all)]
    pub async fn send_verification(
        &self,
        request: &EmailRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/verification/send",
            Some(request),
            &Forwarded::default(),
            self.config.dispatch_timeout,
        )
        .await
    }

    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn confirm_verification(
        &self,
        request: &VerificationConfirmRequest,
        forwarded: &Forwarded,
    ) -> Result<UpstreamResponse, UpstreamError> {
        request.validate()?;
        self.send(
            Method::POST,
            "/auth/verification/confirm",
            Some(request),
            forwarded,
            self.config.timeout,
        )
        .await?
        .ensure_success(None)
    }

    /// # Errors
    /// See [`UpstreamError`].
    #[instrument(skip_all)]
    pub async fn me(&self, forwarded: &Forwarded) -> Result<UpstreamResponse, UpstreamError> {
        self.send::<()>(
            Method::GET,
            "/auth/me",
            None,
            forwarded,
            self.config.interactive_timeout,
        )
        .await?
        .ensure_success(None)
    }

    fn endpoint(&self, path: &str) -> Result<String, UpstreamError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or(UpstreamError::Configuration)?;
        Ok(format!("{base}{path}"))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        forwarded: &Forwarded,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint(path)?;

        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(timeout)
            .header(ACCEPT, "application/json")
            .headers(forwarded.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!("{method} {path} failed: {err}");
            UpstreamError::from_transport(&err)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.bytes().await.map_err(|err| {
            warn!("{method} {path} body read failed: {err}");
            UpstreamError::from_transport(&err)
        })?;

        debug!("{method} {path} -> {status}");

        Ok(UpstreamResponse {
            status,
            body: UpstreamBody::decode(&headers, &raw),
            set_cookies: headers.get_all(SET_COOKIE).iter().cloned().collect(),
            cache_control: headers.get(CACHE_CONTROL).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer) -> Result<UpstreamClient> {
        UpstreamClient::new(UpstreamConfig::new(Some(&server.uri()))?)
    }

    fn login_request() -> LoginRequest {
        LoginRequest {
            email: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn config_trims_trailing_slash() -> Result<()> {
        let config = UpstreamConfig::new(Some("https://api.example.com/v1/"))?;
        assert_eq!(config.base_url(), Some("https://api.example.com/v1"));
        assert!(config.is_configured());
        Ok(())
    }

    #[test]
    fn config_rejects_non_http_url() {
        assert!(UpstreamConfig::new(Some("ftp://api.example.com")).is_err());
        assert!(UpstreamConfig::new(Some("not a url")).is_err());
    }

    #[test]
    fn blank_url_is_unconfigured() -> Result<()> {
        let config = UpstreamConfig::new(Some("  "))?;
        assert!(!config.is_configured());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.interactive_timeout(), Duration::from_secs(20));
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn forwarded_copies_credentials_only() -> Result<()> {
        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        inbound.insert(COOKIE, HeaderValue::from_static("sid=1"));
        inbound.insert("x-other", HeaderValue::from_static("nope"));

        let forwarded = Forwarded::from_inbound(&inbound);
        assert_eq!(
            forwarded.authorization().map(HeaderValue::as_bytes),
            Some(&b"Bearer abc"[..])
        );
        assert!(forwarded.headers().get(COOKIE).is_some());
        assert!(forwarded.headers().get("x-other").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn missing_base_url_is_configuration_error() -> Result<()> {
        let client = UpstreamClient::new(UpstreamConfig::new(None)?)?;
        let err = client
            .login(&login_request(), &Forwarded::default())
            .await
            .err();
        assert!(matches!(err, Some(UpstreamError::Configuration)));
        Ok(())
    }

    #[tokio::test]
    async fn validation_runs_before_configuration() -> Result<()> {
        let client = UpstreamClient::new(UpstreamConfig::new(None)?)?;
        let request = LoginRequest {
            email: String::new(),
            password: "x".to_string(),
        };
        let err = client.login(&request, &Forwarded::default()).await.err();
        assert!(matches!(err, Some(UpstreamError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn login_forwards_credentials_and_collects_cookies() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(header("authorization", "Bearer old"))
            .and(body_json(json!({ "email": "user@example.com", "password": "hunter2" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "tok" }))
                    .append_header("set-cookie", "a=1; Path=/")
                    .append_header("set-cookie", "b=2; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut inbound = HeaderMap::new();
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Bearer old"));
        let response = client_for(&server)?
            .login(&login_request(), &Forwarded::from_inbound(&inbound))
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.set_cookies.len(), 2);
        assert_eq!(
            response.body.as_json().and_then(|v| v["access_token"].as_str()),
            Some("tok")
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_classifies_unverified() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "detail": "EMAIL_NOT_VERIFIED" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)?
            .login(&login_request(), &Forwarded::default())
            .await
            .err();
        assert!(matches!(
            err,
            Some(UpstreamError::EmailUnverified { ref email }) if email == "user@example.com"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_returns_non_success_responses() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/password/forgot"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
            .mount(&server)
            .await;

        let response = client_for(&server)?
            .forgot_password(
                &EmailRequest {
                    email: "ghost@example.com".to_string(),
                },
                &Forwarded::default(),
            )
            .await?;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, UpstreamBody::Text("no such user".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn slow_upstream_times_out() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/password/forgot"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config =
            UpstreamConfig::new(Some(&server.uri()))?.with_timeout(Duration::from_millis(200));
        let err = UpstreamClient::new(config)?
            .forgot_password(
                &EmailRequest {
                    email: "user@example.com".to_string(),
                },
                &Forwarded::default(),
            )
            .await
            .err();
        assert!(matches!(err, Some(UpstreamError::Timeout)));
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() -> Result<()> {
        let client = UpstreamClient::new(UpstreamConfig::new(Some("http://127.0.0.1:1"))?)?;
        let err = client.me(&Forwarded::default()).await.err();
        assert!(matches!(err, Some(UpstreamError::Unreachable(_))));
        Ok(())
    }
}
