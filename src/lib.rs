//! # Lexgate (auth proxy and session layer)
//!
//! `lexgate` is the backend-for-frontend of the legal assistant product. It
//! exposes JSON proxy routes for every authentication operation (login, signup,
//! password reset, email verification, Google sign-in, profile fetch) and
//! forwards them to the external identity API, normalizing its responses into
//! one client-facing error shape.
//!
//! ## Proxy routes
//!
//! Handlers are stateless transforms: validate the inbound body, forward the
//! caller's `Authorization` and `Cookie` headers untouched, call the upstream
//! operation, and relay the JSON body plus every `Set-Cookie` header. Token
//! contents are never inspected here.
//!
//! ## Session layer
//!
//! The [`session`] module is the client half: a token store shared by every
//! handle of one storage profile (one handle per tab), and a session context
//! that hydrates the user identity through the `/me` proxy route and reacts
//! to token changes made by other handles.

pub mod api;
pub mod cli;
pub mod session;
pub mod upstream;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
