// Monotonic timestamp source
//
// All timestamps in the runtime are nanosecond offsets from a process-local
// monotonic anchor, never wall-clock readings. The anchor pairs an `Instant`
// with the local calendar time captured at the same moment, so offsets can
// still be rendered as human-readable local times without ever going
// backwards when the system clock is adjusted.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Local};
use once_cell::sync::Lazy;

struct ClockAnchor {
    started: Instant,
    wall: DateTime<Local>,
}

static ANCHOR: Lazy<ClockAnchor> = Lazy::new(|| ClockAnchor {
    started: Instant::now(),
    wall: Local::now(),
});

/// Current monotonic timestamp in nanoseconds.
///
/// The origin is a process-local anchor, not the Unix epoch; values are only
/// meaningful relative to other timestamps from the same process.
pub fn now() -> u64 {
    ANCHOR.started.elapsed().as_nanos() as u64
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS.nnnnnnnnn` in local time.
pub fn format_timestamp(ts: u64) -> String {
    let mut out = String::with_capacity(32);
    write_timestamp(ts, &mut out);
    out
}

/// Append the formatted timestamp to `out` without allocating a fresh string.
pub fn write_timestamp(ts: u64, out: &mut String) {
    let secs = (ts / 1_000_000_000) as i64;
    let nanos = ts % 1_000_000_000;

    let wall = ANCHOR.wall + ChronoDuration::seconds(secs);
    let _ = write!(
        out,
        "{}.{:09}",
        wall.format("%Y-%m-%d %H:%M:%S"),
        nanos
    );
}
