//! Client-side session layer.
//!
//! A [`store::SessionStore`] plays the part of browser-local storage shared by
//! every tab of one profile; each tab holds its own [`store::StorageHandle`].
//! A [`context::SessionContext`] owns the token through a
//! [`store::TokenStore`], hydrates the [`identity::UserIdentity`] through an
//! [`gateway::AuthGateway`], and publishes an [`identity::AuthStatus`] on a
//! watch channel.

pub mod context;
pub mod gateway;
pub mod identity;
pub mod store;

pub use context::{SessionAction, SessionContext, SessionError, SessionState};
pub use gateway::{AuthGateway, GatewayError, HttpAuthGateway};
pub use identity::{AuthStatus, Profile, Role, UserIdentity};
pub use store::{SessionStore, StorageEvent, StorageHandle, TokenStore};
