//! Low-level helpers shared across the AG-UI bridge crates.
//!
//! Holds the wall-clock helpers used for generated identifiers and the
//! uptime reported by the status endpoints.

pub mod time_utils;

pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, seconds_since};
