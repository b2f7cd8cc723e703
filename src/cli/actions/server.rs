use crate::{api, upstream::UpstreamConfig};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub upstream_url: Option<String>,
    pub frontend_origin: Option<String>,
    pub upstream_timeout: Duration,
    pub interactive_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl Args {
    /// Build the upstream client configuration.
    ///
    /// # Errors
    /// Returns an error if the upstream URL is not a valid http(s) URL.
    pub fn upstream_config(&self) -> Result<UpstreamConfig> {
        let config = UpstreamConfig::new(self.upstream_url.as_deref())
            .context("invalid LEXGATE_UPSTREAM_URL")?
            .with_timeout(self.upstream_timeout)
            .with_interactive_timeout(self.interactive_timeout)
            .with_dispatch_timeout(self.dispatch_timeout);
        Ok(config)
    }
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.upstream_config()?;
    debug!(
        port = args.port,
        upstream = config.base_url().unwrap_or("<unset>"),
        "starting proxy"
    );

    api::new(args.port, config, args.frontend_origin).await
}
