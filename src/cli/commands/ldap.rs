use clap::{Arg, ArgMatches, Command};

use crate::providers::ldap::Settings;

pub const ARG_LDAP_SERVER: &str = "ldap-server";
pub const ARG_LDAP_BASE_DN: &str = "ldap-base-dn";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub server: Option<String>,
    pub base_dn: Option<String>,
}

impl Options {
    /// Parse LDAP arguments from matches. Whether the server is required
    /// depends on the enabled providers, so it is checked at registration.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            server: get_non_empty(ARG_LDAP_SERVER),
            base_dn: get_non_empty(ARG_LDAP_BASE_DN),
        }
    }
}

impl From<Options> for Settings {
    fn from(options: Options) -> Self {
        Self {
            server: options.server,
            base_dn: options.base_dn,
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LDAP_SERVER)
                .long(ARG_LDAP_SERVER)
                .help("LDAP server URI, example: ldap://127.0.0.1:389")
                .env("WICKET_LDAP_SERVER"),
        )
        .arg(
            Arg::new(ARG_LDAP_BASE_DN)
                .long(ARG_LDAP_BASE_DN)
                .help("LDAP base DN (accepted, not used for binding)")
                .env("WICKET_LDAP_BASE_DN"),
        )
}
