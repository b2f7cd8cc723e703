//! Client for the external identity API.
//!
//! Every operation validates its typed request before any network call, resolves
//! the endpoint from the configured base URL, applies a bounded timeout, decodes
//! the response defensively, and classifies non-2xx statuses into
//! [`UpstreamError`] variants the proxy handlers translate for the browser.
//!
//! Timeouts come in three classes:
//!
//! - **Non-interactive** (password reset request, email verification confirm): 10s.
//! - **Interactive** (login, register, Google exchange, password change, me): 20s.
//! - **Dispatch** (verification email send, after signup or on resend): 5s.

mod body;
mod client;
mod dispatch;
mod error;
pub mod types;

pub use body::UpstreamBody;
pub use client::{Forwarded, UpstreamClient, UpstreamConfig, UpstreamResponse};
pub use dispatch::{DispatchEvent, DispatchOutcome, VerificationDispatcher};
pub use error::UpstreamError;

/// Upstream detail codes for an unverified account. Both spellings are seen in
/// the wild and normalize to [`EMAIL_UNVERIFIED`].
pub const EMAIL_UNVERIFIED: &str = "EMAIL_UNVERIFIED";
pub const EMAIL_NOT_VERIFIED: &str = "EMAIL_NOT_VERIFIED";
