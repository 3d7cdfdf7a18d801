#[macro_use]
extern crate anyhow;

use std::{fmt, num::NonZeroUsize, str::FromStr};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel {
    pub level: usize,
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel { level: 0 }),
            "warn" => Ok(LogLevel { level: 1 }),
            "info" => Ok(LogLevel { level: 2 }),
            "debug" => Ok(LogLevel { level: 3 }),
            "trace" => Ok(LogLevel { level: 4 }),
            "none" => Ok(LogLevel { level: 5 }),
            _ => Err("no match"),
        }
    }
}

impl LogLevel {
    pub fn is_none(&self) -> bool {
        self.level > 4
    }
    pub fn get_level(&self) -> usize {
        if self.level > 4 {
            0
        } else {
            self.level
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_str = ["error", "warn", "info", "debug", "trace", "none"];
        if self.level < 6 {
            write!(f, "{}", level_str[self.level])
        } else {
            write!(f, "unknown")
        }
    }
}

/// Add the logging options shared by all tools (timestamp, loglevel and quiet)
pub fn add_log_args(cmd: Command, default_level: &'static str) -> Command {
    cmd.arg(
        Arg::new("timestamp")
            .short('X')
            .long("timestamp")
            .value_parser(value_parser!(stderrlog::Timestamp))
            .value_name("GRANULARITY")
            .default_value("none")
            .help("Prepend log entries with a timestamp"),
    )
    .arg(
        Arg::new("loglevel")
            .short('l')
            .long("loglevel")
            .value_name("LOGLEVEL")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true)
            .default_value(default_level)
            .help("Set log level"),
    )
    .arg(
        Arg::new("quiet")
            .action(ArgAction::SetTrue)
            .long("quiet")
            .conflicts_with("loglevel")
            .help("Silence all output"),
    )
}

/// Initialize logging from command line arguments
pub fn init_log(m: &ArgMatches) -> anyhow::Result<()> {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .unwrap_or(LogLevel { level: 2 });
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .map_err(|e| anyhow!("Could not initialize logging: {}", e))
}

/// Number of threads from a NonZeroUsize option, defaulting to the available cores
pub fn get_threads(m: &ArgMatches, id: &str) -> usize {
    m.get_one::<NonZeroUsize>(id)
        .map(|x| usize::from(*x))
        .unwrap_or_else(num_cpus::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_levels() {
        assert_eq!(LogLevel::from_str("WARN").unwrap().level, 1);
        assert_eq!(LogLevel::from_str("trace").unwrap().get_level(), 4);
        let none = LogLevel::from_str("none").unwrap();
        assert!(none.is_none());
        assert_eq!(none.get_level(), 0);
        assert!(LogLevel::from_str("loud").is_err());
        assert_eq!(format!("{}", LogLevel { level: 3 }), "debug");
    }

    #[test]
    fn threads_default_to_cores() {
        let cmd = Command::new("t").arg(
            Arg::new("threads")
                .short('t')
                .value_parser(value_parser!(NonZeroUsize)),
        );
        let m = cmd.clone().get_matches_from(["t", "-t", "3"]);
        assert_eq!(get_threads(&m, "threads"), 3);
        let m = cmd.get_matches_from(["t"]);
        assert_eq!(get_threads(&m, "threads"), num_cpus::get());
    }

    #[test]
    fn log_args_defaults() {
        let m = add_log_args(Command::new("t"), "info").get_matches_from(["t"]);
        assert_eq!(m.get_one::<LogLevel>("loglevel").copied(), Some(LogLevel { level: 2 }));
        assert!(!m.get_flag("quiet"));
    }
}
