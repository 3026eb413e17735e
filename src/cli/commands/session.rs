use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_COOKIE_EXPIRY_HOURS: &str = "cookie-expiry-hours";

#[derive(Debug, Clone)]
pub struct Options {
    pub name: String,
    /// `None` means a random secret is generated at startup.
    pub secret: Option<SecretString>,
    pub expiry_hours: u64,
}

impl Options {
    /// Parse session cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the cookie name is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let name = match matches.get_one::<String>(ARG_COOKIE_NAME) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_COOKIE_NAME}"),
        };

        let secret = matches
            .get_one::<String>(ARG_COOKIE_SECRET)
            .filter(|value| !value.is_empty())
            .map(|value| SecretString::from(value.clone()));

        let expiry_hours = matches
            .get_one::<u64>(ARG_COOKIE_EXPIRY_HOURS)
            .copied()
            .unwrap_or(168);

        Ok(Self {
            name,
            secret,
            expiry_hours,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie, also the signing key")
                .env("WICKET_COOKIE_NAME")
                .default_value("_wicket"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret used to sign session cookies")
                .long_help(
                    "Secret used to sign session cookies.\n\nWhen unset a random secret is generated at startup, so sessions do not survive a restart\nand are not shared between instances.",
                )
                .env("WICKET_COOKIE_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_EXPIRY_HOURS)
                .long(ARG_COOKIE_EXPIRY_HOURS)
                .help("Session lifetime in hours")
                .env("WICKET_COOKIE_EXPIRY_HOURS")
                .default_value("168")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
