//! wait.rs
//!
//! Turns a rate-limit reset instant into the message shown to the user:
//!     "Try again in 1 hour, 12 minutes (after 14:05:00)"
//!
//! The remaining time is rounded up to the next whole minute so that
//! following the advice never lands before the reset.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Display;

/// Returns the "try again" message, rendering the reset time in `tz`.
pub fn wait_message<Tz>(reset_at: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = reset_at.with_timezone(tz);
    format!(
        "Try again in {} (after {})",
        wait_string(reset_at, now),
        local.format("%H:%M:%S")
    )
}

/// Human wait duration, e.g. "2 hours, 1 minute" or "less than a minute".
pub fn wait_string(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (reset_at - now).num_seconds();
    if secs <= 0 {
        return "less than a minute".to_string();
    }

    let minutes = (secs + 59) / 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;

    match (hours, minutes) {
        (0, m) => format!("{m} minute{}", plural(m)),
        (h, 0) => format!("{h} hour{}", plural(h)),
        (h, m) => format!("{h} hour{}, {m} minute{}", plural(h), plural(m)),
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}
