//! Command handlers for the `vision-tech` binary.
//!
//! Handlers print human-readable output to stdout; diagnostics go through
//! `tracing` to stderr.

pub mod jobs;
pub mod results;

pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

use chrono::{DateTime, Local, Utc};

pub(crate) fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
