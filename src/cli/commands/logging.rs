use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order, `-v` count is the index.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Parse `WICKET_LOG_LEVEL` as either a level name or its verbosity count.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        let level = level.trim();
        let index = match level.parse::<usize>() {
            Ok(count) => Some(count).filter(|count| *count < LEVELS.len()),
            Err(_) => LEVELS
                .iter()
                .position(|name| name.eq_ignore_ascii_case(level)),
        };

        index.and_then(|index| u8::try_from(index).ok()).ok_or_else(|| {
            format!(
                "invalid log level {level:?}, expected 0-4 or one of {}",
                LEVELS.join(", ")
            )
        })
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("WICKET_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(level: &str) -> Result<u8, clap::Error> {
        let command = Command::new("wicket").arg(
            Arg::new(ARG_VERBOSITY)
                .long("level")
                .value_parser(validator_log_level()),
        );
        command
            .try_get_matches_from(["wicket", "--level", level])
            .map(|matches| matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or_default())
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(parse("error").ok(), Some(0));
        assert_eq!(parse("Warn").ok(), Some(1));
        assert_eq!(parse("INFO").ok(), Some(2));
        assert_eq!(parse(" debug ").ok(), Some(3));
        assert_eq!(parse("trace").ok(), Some(4));
    }

    #[test]
    fn counts_stop_at_trace() {
        assert_eq!(parse("0").ok(), Some(0));
        assert_eq!(parse("4").ok(), Some(4));
        assert!(parse("5").is_err());
        assert!(parse("300").is_err());
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(parse("verbose").is_err());
        assert!(parse("-1").is_err());
        assert!(parse("").is_err());
    }
}
