use clap::{Arg, ArgMatches, Command};

pub const ARG_UPSTREAM_URL: &str = "upstream-url";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";
pub const ARG_UPSTREAM_TIMEOUT: &str = "upstream-timeout-seconds";
pub const ARG_INTERACTIVE_TIMEOUT: &str = "interactive-timeout-seconds";
pub const ARG_DISPATCH_TIMEOUT: &str = "dispatch-timeout-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub url: Option<String>,
    pub frontend_origin: Option<String>,
    pub timeout_seconds: u64,
    pub interactive_timeout_seconds: u64,
    pub dispatch_timeout_seconds: u64,
}

impl Options {
    /// Parse upstream arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // clap passes through env vars set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let read_seconds = |id: &str, default: u64| -> anyhow::Result<u64> {
            let seconds = matches.get_one::<u64>(id).copied().unwrap_or(default);
            if seconds == 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            Ok(seconds)
        };

        Ok(Self {
            url: get_non_empty(ARG_UPSTREAM_URL),
            frontend_origin: get_non_empty(ARG_FRONTEND_ORIGIN),
            timeout_seconds: read_seconds(ARG_UPSTREAM_TIMEOUT, 10)?,
            interactive_timeout_seconds: read_seconds(ARG_INTERACTIVE_TIMEOUT, 20)?,
            dispatch_timeout_seconds: read_seconds(ARG_DISPATCH_TIMEOUT, 5)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_UPSTREAM_URL)
                .long(ARG_UPSTREAM_URL)
                .help("Base URL of the identity API, e.g. https://api.lexgate.dev")
                .long_help(
                    "Base URL of the identity API. When unset the server still starts, but every proxy route answers 500.",
                )
                .env("LEXGATE_UPSTREAM_URL"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Front end URL allowed to call the proxy with credentials (CORS)")
                .env("LEXGATE_FRONTEND_ORIGIN"),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_TIMEOUT)
                .long(ARG_UPSTREAM_TIMEOUT)
                .help("Timeout for non-interactive upstream calls, in seconds")
                .env("LEXGATE_UPSTREAM_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_INTERACTIVE_TIMEOUT)
                .long(ARG_INTERACTIVE_TIMEOUT)
                .help("Timeout for interactive upstream calls (login, signup, Google, me), in seconds")
                .env("LEXGATE_INTERACTIVE_TIMEOUT_SECONDS")
                .default_value("20")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DISPATCH_TIMEOUT)
                .long(ARG_DISPATCH_TIMEOUT)
                .help("Timeout for verification email dispatch, in seconds")
                .env("LEXGATE_DISPATCH_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}
