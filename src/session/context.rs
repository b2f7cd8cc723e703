//! Session state machine.
//!
//! `Loading → Authenticated | Unauthenticated`, back to `Loading` on every
//! refresh or sign-in attempt. Hydration is last-call-wins: each run takes a
//! generation number and its result is dropped if a newer hydration, sign-in
//! or logout started meanwhile. Sign-in style actions are additionally guarded
//! per action, so a double submit fails fast instead of racing.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    gateway::{AuthGateway, GatewayError},
    identity::{AuthStatus, UserIdentity},
    store::{TokenStore, TOKEN_KEY},
};
use crate::upstream::types::AccessTokenBody;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub status: AuthStatus,
    pub user: Option<UserIdentity>,
}

impl SessionState {
    fn loading() -> Self {
        Self {
            status: AuthStatus::Loading,
            user: None,
        }
    }

    fn authenticated(user: UserIdentity) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            user: Some(user),
        }
    }

    fn unauthenticated() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            user: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionAction {
    Login,
    GoogleIdToken,
    GoogleCode,
    Signup,
    VerifyEmail,
    ResendVerification,
    ChangePassword,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0:?} is already in progress")]
    InFlight(SessionAction),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("no email to send the verification to")]
    NoPendingEmail,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

struct Shared<G> {
    tokens: TokenStore,
    gateway: G,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    in_flight: Mutex<HashSet<SessionAction>>,
}

/// Owns the session of one tab.
pub struct SessionContext<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for SessionContext<G> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct InFlightGuard<'a> {
    actions: &'a Mutex<HashSet<SessionAction>>,
    action: SessionAction,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.action);
    }
}

impl<G: AuthGateway> SessionContext<G> {
    #[must_use]
    pub fn new(tokens: TokenStore, gateway: G) -> Self {
        let (state, _) = watch::channel(SessionState::loading());
        Self {
            shared: Arc::new(Shared {
                tokens,
                gateway,
                state,
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.shared.state.borrow().status
    }

    #[must_use]
    pub fn user(&self) -> Option<UserIdentity> {
        self.shared.state.borrow().user.clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.shared.tokens.token()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.shared.tokens
    }

    /// Initial hydration.
    pub async fn mount(&self) -> AuthStatus {
        self.hydrate().await
    }

    /// Back to `Loading`, then hydrate again. Used after the token was written
    /// outside of the sign-in actions.
    pub async fn refresh(&self) -> AuthStatus {
        self.set_loading();
        self.hydrate().await
    }

    /// # Errors
    /// [`SessionError::InFlight`] on a concurrent login, or the proxy failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionState, SessionError> {
        let _guard = self.begin(SessionAction::Login)?;
        let result = self.shared.gateway.login(email, password).await;
        self.complete_sign_in(result).await
    }

    /// # Errors
    /// [`SessionError::InFlight`] on a concurrent exchange, or the proxy failure.
    pub async fn login_with_google_id_token(
        &self,
        id_token: &str,
    ) -> Result<SessionState, SessionError> {
        let _guard = self.begin(SessionAction::GoogleIdToken)?;
        let result = self.shared.gateway.exchange_google_id_token(id_token).await;
        self.complete_sign_in(result).await
    }

    /// Popup flow variant of [`Self::login_with_google_id_token`].
    ///
    /// # Errors
    /// [`SessionError::InFlight`] on a concurrent exchange, or the proxy failure.
    pub async fn login_with_google_code(&self, code: &str) -> Result<SessionState, SessionError> {
        let _guard = self.begin(SessionAction::GoogleCode)?;
        let result = self.shared.gateway.exchange_google_code(code).await;
        self.complete_sign_in(result).await
    }

    /// Drop the token and identity. No network call.
    pub fn logout(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.forget();
        self.shared.state.send_replace(SessionState::unauthenticated());
        info!("signed out");
    }

    /// Register and remember the email for the verification screen. A token in
    /// the answer signs the user in.
    ///
    /// # Errors
    /// [`SessionError::InFlight`] on a concurrent signup, or the proxy failure.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Value, SessionError> {
        let _guard = self.begin(SessionAction::Signup)?;
        let body = self.shared.gateway.signup(name, email, password).await?;
        self.shared.tokens.set_pending_email(email);

        if let Ok(AccessTokenBody { access_token }) =
            serde_json::from_value::<AccessTokenBody>(body.clone())
        {
            self.shared
                .tokens
                .set_token(&SecretString::from(access_token));
            self.refresh().await;
        }

        Ok(body)
    }

    /// # Errors
    /// The proxy failure; [`GatewayError::offers_new_link`] tells whether
    /// resending applies.
    pub async fn verify_email(&self, token: &str) -> Result<(), SessionError> {
        let _guard = self.begin(SessionAction::VerifyEmail)?;
        self.shared.gateway.verify_email(token).await?;
        self.shared.tokens.clear_pending_email();
        Ok(())
    }

    /// Resend to `email`, or to the email remembered at signup.
    ///
    /// # Errors
    /// [`SessionError::NoPendingEmail`] when there is no address to use.
    pub async fn resend_verification(&self, email: Option<&str>) -> Result<bool, SessionError> {
        let _guard = self.begin(SessionAction::ResendVerification)?;
        let email = match email.map(str::trim).filter(|email| !email.is_empty()) {
            Some(email) => email.to_string(),
            None => self
                .shared
                .tokens
                .pending_email()
                .ok_or(SessionError::NoPendingEmail)?,
        };
        Ok(self.shared.gateway.resend_verification(&email).await?)
    }

    /// Change the password of the signed-in user, then sign out locally.
    ///
    /// # Errors
    /// [`SessionError::NotAuthenticated`] without a token, or the proxy failure.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let _guard = self.begin(SessionAction::ChangePassword)?;
        let token = self
            .shared
            .tokens
            .token()
            .ok_or(SessionError::NotAuthenticated)?;
        self.shared
            .gateway
            .change_password(&token, current_password, new_password)
            .await?;
        self.logout();
        Ok(())
    }

    /// Refresh whenever another handle on the same storage changes the token.
    pub fn spawn_storage_listener(&self) -> JoinHandle<()> {
        let context = self.clone();
        let own_origin = self.shared.tokens.storage().origin();
        let mut events = self.shared.tokens.storage().subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.key == TOKEN_KEY && event.origin != own_origin => {
                        debug!("token changed in another tab");
                        context.refresh().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("storage listener lagged by {skipped} events");
                        context.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn hydrate(&self) -> AuthStatus {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tokens = &self.shared.tokens;

        let Some(token) = tokens.token() else {
            let state = tokens
                .cached_user()
                .map_or_else(SessionState::unauthenticated, SessionState::authenticated);
            return self.publish(generation, state);
        };

        let result = self.shared.gateway.fetch_profile(&token).await;
        if !self.is_current(generation) {
            debug!("discarding stale hydration");
            return self.status();
        }

        match result {
            Ok(profile) => {
                let user = UserIdentity::from(profile);
                tokens.cache_user(&user);
                self.publish(generation, SessionState::authenticated(user))
            }
            Err(err) => {
                debug!("hydration failed: {err}");
                self.forget();
                self.publish(generation, SessionState::unauthenticated())
            }
        }
    }

    async fn complete_sign_in(
        &self,
        result: Result<AccessTokenBody, GatewayError>,
    ) -> Result<SessionState, SessionError> {
        match result {
            Ok(AccessTokenBody { access_token }) => {
                self.shared
                    .tokens
                    .set_token(&SecretString::from(access_token));
                self.hydrate().await;
                Ok(self.state())
            }
            Err(err) => {
                self.shared.generation.fetch_add(1, Ordering::SeqCst);
                self.forget();
                self.shared.state.send_replace(SessionState::unauthenticated());
                Err(err.into())
            }
        }
    }

    fn begin(&self, action: SessionAction) -> Result<InFlightGuard<'_>, SessionError> {
        let inserted = self
            .shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(action);
        if !inserted {
            return Err(SessionError::InFlight(action));
        }
        if matches!(
            action,
            SessionAction::Login | SessionAction::GoogleIdToken | SessionAction::GoogleCode
        ) {
            self.set_loading();
        }
        Ok(InFlightGuard {
            actions: &self.shared.in_flight,
            action,
        })
    }

    fn set_loading(&self) {
        self.shared.state.send_modify(|state| {
            state.status = AuthStatus::Loading;
        });
    }

    // Snapshot before token; other tabs re-hydrate on the token event.
    fn forget(&self) {
        self.shared.tokens.clear_cached_user();
        self.shared.tokens.clear_token();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, state: SessionState) -> AuthStatus {
        self.shared.state.send_if_modified(|current| {
            if self.is_current(generation) && *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
        self.status()
    }
}
