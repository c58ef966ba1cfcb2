use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::{Build, Config, LoggerConfig};
use std::path::Path;

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

/// Builds a default terminal logger writing to stderr. Used when no logging
/// configuration file is deployed next to the executable.
pub fn init() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);

    builder.build().expect("Error building terminal logger")
}

/// Builds a logger from a `sloggers` TOML configuration file.
pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_file(path).expect("Error loading logger configuration file");

    config.build_logger().expect("Error building configured logger")
}
