//! Console sink for the driver's leveled logger.
//!
//! Levels map from the CLI flags:
//! - **Quiet** (`-q`): warnings and errors
//! - **Default** (no flag): progress messages
//! - **Verbose** (`-v`, `-vv`): debug, then trace

use std::io::Write;

use bcmtest_core::log::{self, LogLevel};

/// Installs the stderr log function and picks the maximum level.
pub fn init(quiet: bool, verbose: u8) {
    log::set_max_level(level_for(quiet, verbose));
    log::set_log_fn(write_stderr);
}

fn level_for(quiet: bool, verbose: u8) -> LogLevel {
    match (quiet, verbose) {
        (true, _) => LogLevel::Warn,
        (false, 0) => LogLevel::Info,
        (false, 1) => LogLevel::Debug,
        (false, _) => LogLevel::Trace,
    }
}

fn write_stderr(level: LogLevel, args: std::fmt::Arguments<'_>) {
    let mut err = std::io::stderr().lock();
    // A closed stderr is not worth aborting the run over.
    let _ = writeln!(err, "[{}] {}", level.name().trim_end(), args);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_levels() {
        assert_eq!(level_for(true, 0), LogLevel::Warn);
        assert_eq!(level_for(false, 0), LogLevel::Info);
        assert_eq!(level_for(false, 1), LogLevel::Debug);
        assert_eq!(level_for(false, 2), LogLevel::Trace);
        assert_eq!(level_for(false, 9), LogLevel::Trace);
    }
}
