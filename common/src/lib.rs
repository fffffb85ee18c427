/*
 * Copyright 2024 Oxide Computer Company
 */

use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use serde::Deserialize;
use slog::{o, Drain, Logger};

pub fn read_toml<P: AsRef<Path>, T>(n: P) -> Result<T>
where
    for<'de> T: Deserialize<'de>,
{
    let mut f = std::fs::File::open(n.as_ref())?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    Ok(toml::from_str(&s)?)
}

fn debug_enabled() -> bool {
    matches!(
        std::env::var("ZPM_DEBUG")
            .map(|v| v.to_ascii_lowercase())
            .as_deref(),
        Ok("yes") | Ok("1") | Ok("true")
    )
}

pub fn make_log(name: &'static str) -> Logger {
    let filter_level = if debug_enabled() {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };

    if std::io::stdout().is_terminal() {
        /*
         * Use a terminal-formatted logger for interactive processes.  Log
         * records go to stderr so that they do not interleave with the
         * command output proper.
         */
        let dec = slog_term::TermDecorator::new().stderr().build();
        let dr = Mutex::new(
            slog_term::FullFormat::new(dec).use_original_order().build(),
        )
        .filter_level(filter_level)
        .fuse();
        Logger::root(dr, o!("name" => name))
    } else {
        /*
         * Otherwise, emit bunyan-formatted records:
         */
        let dr = Mutex::new(
            slog_bunyan::with_name(name, std::io::stderr())
                .set_flush(true)
                .build(),
        )
        .filter_level(filter_level)
        .fuse();
        Logger::root(dr, o!())
    }
}

/**
 * Construct a logger that discards everything, for library consumers (and
 * tests) that do not care to see pipeline progress.
 */
pub fn discard_log() -> Logger {
    Logger::root(slog::Discard, o!())
}

/**
 * Pick a Content-Type for an object we are about to store, based only on the
 * name it will have in the store.
 */
pub fn guess_mime_type(filename: &str) -> String {
    if filename.ends_with(".zar") {
        /*
         * A ZAR is a (possibly compressed) tar stream, but it is consumed as
         * an opaque image by the execution platform.
         */
        "application/octet-stream".to_string()
    } else {
        new_mime_guess::from_path(std::path::PathBuf::from(filename))
            .first_or_octet_stream()
            .to_string()
    }
}
