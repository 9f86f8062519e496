/*
 * Copyright 2020 Oxide Computer Company
 */

use atty::Stream;
use slog::Drain;
use std::sync::Mutex;

pub use anyhow::{bail, Context, Result};
pub use slog::{debug, error, info, o, trace, warn, Level, Logger};

/**
 * Initialise a logger which writes to stderr, and which does the right thing on
 * both an interactive terminal and when stderr is not a tty.  Stdout is kept
 * for the documents the tool prints.
 */
pub fn init_log() -> Logger {
    init_log_level(Level::Info)
}

/**
 * As for init_log(), but discard any record less severe than "level".  The
 * reconciler emits its partition table dumps at the debug level.
 */
pub fn init_log_level(level: Level) -> Logger {
    let dec = slog_term::TermDecorator::new().stderr().build();
    if atty::is(Stream::Stderr) {
        let dr = Mutex::new(slog_term::CompactFormat::new(dec).build())
            .filter_level(level)
            .fuse();
        slog::Logger::root(dr, o!())
    } else {
        let dr = Mutex::new(
            slog_term::FullFormat::new(dec).use_original_order().build(),
        )
        .filter_level(level)
        .fuse();
        slog::Logger::root(dr, o!())
    }
}

/**
 * Log each line of a multi-line rendering (e.g., a partition table dump) as
 * its own debug record.
 */
pub fn debug_lines<L: AsRef<str>>(log: &Logger, heading: &str, lines: &[L]) {
    debug!(log, "{}", heading);
    for l in lines {
        debug!(log, "{}", l.as_ref());
    }
}
