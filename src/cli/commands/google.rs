use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::providers::google::{
    Settings, DEFAULT_AUTH_URL, DEFAULT_TOKEN_URL, DEFAULT_USERINFO_URL,
};

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_DOMAINS: &str = "google-domains";
pub const ARG_GOOGLE_AUTH_URL: &str = "google-auth-url";
pub const ARG_GOOGLE_TOKEN_URL: &str = "google-token-url";
pub const ARG_GOOGLE_USERINFO_URL: &str = "google-userinfo-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub domains: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let domains = matches
            .get_many::<String>(ARG_GOOGLE_DOMAINS)
            .map(|values| {
                values
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            client_id: get_non_empty(ARG_GOOGLE_CLIENT_ID),
            client_secret: get_non_empty(ARG_GOOGLE_CLIENT_SECRET).map(SecretString::from),
            domains,
            auth_url: get_non_empty(ARG_GOOGLE_AUTH_URL)
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            token_url: get_non_empty(ARG_GOOGLE_TOKEN_URL)
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            userinfo_url: get_non_empty(ARG_GOOGLE_USERINFO_URL)
                .unwrap_or_else(|| DEFAULT_USERINFO_URL.to_string()),
        }
    }
}

impl From<Options> for Settings {
    fn from(options: Options) -> Self {
        Self {
            client_id: options.client_id,
            client_secret: options.client_secret,
            domains: options.domains,
            auth_url: options.auth_url,
            token_url: options.token_url,
            userinfo_url: options.userinfo_url,
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client ID, example: 123456.apps.googleusercontent.com")
                .env("WICKET_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("WICKET_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_DOMAINS)
                .long(ARG_GOOGLE_DOMAINS)
                .help("Accepted email domains, comma separated (default: any)")
                .env("WICKET_GOOGLE_DOMAINS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_GOOGLE_AUTH_URL)
                .long(ARG_GOOGLE_AUTH_URL)
                .help("OAuth2 authorize endpoint")
                .env("WICKET_GOOGLE_AUTH_URL")
                .default_value(DEFAULT_AUTH_URL),
        )
        .arg(
            Arg::new(ARG_GOOGLE_TOKEN_URL)
                .long(ARG_GOOGLE_TOKEN_URL)
                .help("OAuth2 token endpoint")
                .env("WICKET_GOOGLE_TOKEN_URL")
                .default_value(DEFAULT_TOKEN_URL),
        )
        .arg(
            Arg::new(ARG_GOOGLE_USERINFO_URL)
                .long(ARG_GOOGLE_USERINFO_URL)
                .help("Userinfo endpoint")
                .env("WICKET_GOOGLE_USERINFO_URL")
                .default_value(DEFAULT_USERINFO_URL),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const VARS: [&str; 6] = [
        "WICKET_GOOGLE_CLIENT_ID",
        "WICKET_GOOGLE_CLIENT_SECRET",
        "WICKET_GOOGLE_DOMAINS",
        "WICKET_GOOGLE_AUTH_URL",
        "WICKET_GOOGLE_TOKEN_URL",
        "WICKET_GOOGLE_USERINFO_URL",
    ];

    #[test]
    fn defaults_point_at_google() {
        temp_env::with_vars(VARS.map(|var| (var, None::<&str>)), || {
            let matches = with_args(Command::new("wicket")).get_matches_from(vec!["wicket"]);
            let options = Options::parse(&matches);
            assert!(options.client_id.is_none());
            assert!(options.client_secret.is_none());
            assert!(options.domains.is_empty());
            assert_eq!(options.auth_url, DEFAULT_AUTH_URL);
            assert_eq!(options.token_url, DEFAULT_TOKEN_URL);
            assert_eq!(options.userinfo_url, DEFAULT_USERINFO_URL);
        });
    }

    #[test]
    fn domains_from_env_are_split() {
        temp_env::with_vars(
            [
                ("WICKET_GOOGLE_CLIENT_ID", Some("client-123")),
                ("WICKET_GOOGLE_CLIENT_SECRET", Some("shh")),
                ("WICKET_GOOGLE_DOMAINS", Some("example.com, example.org")),
            ],
            || {
                let matches = with_args(Command::new("wicket")).get_matches_from(vec!["wicket"]);
                let settings = Settings::from(Options::parse(&matches));
                assert_eq!(settings.client_id.as_deref(), Some("client-123"));
                assert_eq!(
                    settings
                        .client_secret
                        .as_ref()
                        .map(|s| s.expose_secret().to_string()),
                    Some("shh".to_string())
                );
                assert_eq!(settings.domains, vec!["example.com", "example.org"]);
            },
        );
    }

    #[test]
    fn domains_flag_repeats() {
        temp_env::with_vars([("WICKET_GOOGLE_DOMAINS", None::<&str>)], || {
            let matches = with_args(Command::new("wicket")).get_matches_from(vec![
                "wicket",
                "--google-domains",
                "example.com",
                "--google-domains",
                "example.net,example.org",
            ]);
            let options = Options::parse(&matches);
            assert_eq!(
                options.domains,
                vec!["example.com", "example.net", "example.org"]
            );
        });
    }
}
