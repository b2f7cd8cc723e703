//! End-to-end tests for the proxy and the session layer.
//!
//! Each test:
//! 1. Starts a mock identity API with `wiremock`.
//! 2. Serves the proxy app on an ephemeral port.
//! 3. Drives a `SessionContext` through `HttpAuthGateway` against it.

use anyhow::{Context, Result};
use lexgate::{
    api::{self, ProxyState},
    session::{
        AuthStatus, HttpAuthGateway, Role, SessionContext, SessionError, SessionStore, TokenStore,
    },
    upstream::{UpstreamClient, UpstreamConfig},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

struct Proxy {
    base_url: String,
    server: JoinHandle<()>,
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn spawn_proxy(upstream: &MockServer) -> Result<Proxy> {
    let config = UpstreamConfig::new(Some(&upstream.uri()))?
        .with_interactive_timeout(Duration::from_secs(2))
        .with_dispatch_timeout(Duration::from_secs(1));
    let state = Arc::new(ProxyState::new(UpstreamClient::new(config)?));
    let app = api::app(state, None);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind ephemeral port")?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(Proxy {
        base_url: format!("http://{addr}"),
        server,
    })
}

fn session(store: &SessionStore, proxy: &Proxy) -> Result<SessionContext<HttpAuthGateway>> {
    let gateway = HttpAuthGateway::new(&proxy.base_url)?;
    Ok(SessionContext::new(TokenStore::new(store.handle()), gateway))
}

async fn mount_profile(upstream: &MockServer, token: &str, role: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "u_42",
            "org_id": "org_7",
            "role": role,
            "perms": ["matters:read", "matters:write"],
            "twofa": true,
            "exp": 1_900_000_000
        })))
        .mount(upstream)
        .await;
}

#[tokio::test]
async fn login_then_me_hydrates_identity() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "ada@firm.law", "password": "s3cret!" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "tok-ada" }))
                .append_header("set-cookie", "lf_refresh=r1; HttpOnly; Path=/"),
        )
        .expect(1)
        .mount(&upstream)
        .await;
    mount_profile(&upstream, "tok-ada", "solicitor").await;

    let proxy = spawn_proxy(&upstream).await?;
    let store = SessionStore::new();
    let context = session(&store, &proxy)?;

    assert_eq!(context.mount().await, AuthStatus::Unauthenticated);

    let state = context.login("ada@firm.law", "s3cret!").await?;
    assert_eq!(state.status, AuthStatus::Authenticated);
    let user = state.user.context("user after login")?;
    assert_eq!(user.id, "u_42");
    assert_eq!(user.org_id, "org_7");
    assert_eq!(user.role, Role::Solicitor);
    assert!(user.two_factor);
    assert!(user.has_permission("matters:write"));

    // A second tab on the same storage profile hydrates from the stored token.
    let other = session(&store, &proxy)?;
    assert_eq!(other.mount().await, AuthStatus::Authenticated);
    assert_eq!(other.user().map(|user| user.org_id), Some("org_7".to_string()));

    Ok(())
}

#[tokio::test]
async fn unverified_login_surfaces_code_and_email() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "EMAIL_NOT_VERIFIED" })),
        )
        .mount(&upstream)
        .await;

    let proxy = spawn_proxy(&upstream).await?;
    let context = session(&SessionStore::new(), &proxy)?;
    context.mount().await;

    let Err(SessionError::Gateway(err)) = context.login(" ada@firm.law ", "s3cret!").await else {
        panic!("expected a gateway error");
    };
    assert_eq!(err.status, Some(403));
    assert!(err.is_unverified());
    assert_eq!(err.email.as_deref(), Some("ada@firm.law"));
    assert_eq!(context.status(), AuthStatus::Unauthenticated);

    Ok(())
}

#[tokio::test]
async fn logout_in_one_tab_signs_out_the_other() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok-1" })))
        .mount(&upstream)
        .await;
    mount_profile(&upstream, "tok-1", "admin").await;

    let proxy = spawn_proxy(&upstream).await?;
    let store = SessionStore::new();
    let first = session(&store, &proxy)?;
    let second = session(&store, &proxy)?;

    first.mount().await;
    first.login("admin@firm.law", "pw").await?;
    assert_eq!(second.mount().await, AuthStatus::Authenticated);

    let listener = second.spawn_storage_listener();
    let mut states = second.subscribe();

    first.logout();

    timeout(
        Duration::from_secs(5),
        states.wait_for(|state| state.status == AuthStatus::Unauthenticated),
    )
    .await
    .context("second tab never signed out")??;
    assert!(second.user().is_none());
    assert!(second.token().is_none());

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn signup_with_failed_dispatch_then_resend() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(body_json(json!({
            "full_name": "Grace Hopper",
            "email": "grace@firm.law",
            "password": "n4vy!"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "u_9" })))
        .expect(1)
        .mount(&upstream)
        .await;
    // First dispatch fails, the resend goes through.
    Mock::given(method("POST"))
        .and(path("/auth/verification/send"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/verification/send"))
        .and(body_json(json!({ "email": "grace@firm.law" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(&upstream)
        .await;

    let proxy = spawn_proxy(&upstream).await?;
    let context = session(&SessionStore::new(), &proxy)?;
    context.mount().await;

    let body = context
        .signup("Grace Hopper", "grace@firm.law", "n4vy!")
        .await?;
    assert_eq!(body, json!({ "id": "u_9" }));
    assert_eq!(
        context.tokens().pending_email().as_deref(),
        Some("grace@firm.law")
    );
    assert_eq!(context.status(), AuthStatus::Unauthenticated);

    assert!(context.resend_verification(None).await?);

    Ok(())
}

#[tokio::test]
async fn expired_verification_link_offers_resend() -> Result<()> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/verification/confirm"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "TOKEN_EXPIRED" })),
        )
        .mount(&upstream)
        .await;

    let proxy = spawn_proxy(&upstream).await?;
    let context = session(&SessionStore::new(), &proxy)?;

    let Err(SessionError::Gateway(err)) = context.verify_email("stale").await else {
        panic!("expected a gateway error");
    };
    assert_eq!(err.code.as_deref(), Some("TOKEN_EXPIRED"));
    assert!(err.offers_new_link());

    Ok(())
}
