use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

use crate::providers::htpasswd::Settings;

pub const ARG_HTPASSWD: &str = "htpasswd";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            path: matches
                .get_one::<PathBuf>(ARG_HTPASSWD)
                .filter(|path| !path.as_os_str().is_empty())
                .cloned(),
        }
    }
}

impl From<Options> for Settings {
    fn from(options: Options) -> Self {
        Self { path: options.path }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_HTPASSWD)
            .long(ARG_HTPASSWD)
            .help("Path to the htpasswd file (bcrypt or {SHA} entries)")
            .env("WICKET_HTPASSWD")
            .value_parser(clap::value_parser!(PathBuf)),
    )
}
