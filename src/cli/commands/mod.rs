pub mod google;
pub mod htpasswd;
pub mod ldap;
pub mod logging;
pub mod session;

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        PossibleValuesParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};
use std::net::SocketAddr;

pub const ARG_LISTEN: &str = "listen";
pub const ARG_UPSTREAM: &str = "upstream";
pub const ARG_PROVIDERS: &str = "providers";
pub const ARG_OUTBOUND_TIMEOUT_SECONDS: &str = "outbound-timeout-seconds";

/// Provider names accepted by `--providers`, in default registration order.
pub const PROVIDERS: [&str; 3] = ["htpasswd", "ldap", "google"];

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("wicket")
        .about("Authentication gateway in front of a single HTTP upstream")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_LISTEN)
                .short('l')
                .long(ARG_LISTEN)
                .help("<addr>:<port> to listen on for HTTP clients")
                .env("WICKET_LISTEN")
                .default_value("127.0.0.1:4180")
                .value_parser(clap::value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new(ARG_UPSTREAM)
                .short('u')
                .long(ARG_UPSTREAM)
                .help("Base URL of the upstream, example: http://127.0.0.1:8080")
                .env("WICKET_UPSTREAM")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDERS)
                .long(ARG_PROVIDERS)
                .help("Enabled login providers, comma separated, in login page order")
                .env("WICKET_PROVIDERS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(PossibleValuesParser::new(PROVIDERS))
                .default_values(PROVIDERS),
        )
        .arg(
            Arg::new(ARG_OUTBOUND_TIMEOUT_SECONDS)
                .long(ARG_OUTBOUND_TIMEOUT_SECONDS)
                .help("Timeout for calls to identity providers")
                .env("WICKET_OUTBOUND_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        );

    let command = session::with_args(command);
    let command = htpasswd::with_args(command);
    let command = ldap::with_args(command);
    let command = google::with_args(command);
    logging::with_args(command)
}
