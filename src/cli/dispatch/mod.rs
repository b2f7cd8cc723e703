//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::upstream;
use anyhow::Result;
use std::time::Duration;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an upstream option is invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let upstream_opts = upstream::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        upstream_url: upstream_opts.url,
        frontend_origin: upstream_opts.frontend_origin,
        upstream_timeout: Duration::from_secs(upstream_opts.timeout_seconds),
        interactive_timeout: Duration::from_secs(upstream_opts.interactive_timeout_seconds),
        dispatch_timeout: Duration::from_secs(upstream_opts.dispatch_timeout_seconds),
    }))
}
