use std::time::Duration;

/// Parse a whole number of `unit`s from a string into a [`Duration`]. `unit` is the duration of one unit, e.g.
/// `Duration::from_secs(1)` for a value given in seconds.
///
/// Zero is rejected, since every duration in the pipeline configuration is a window or a timeout.
pub fn parse_duration(value: &str, unit: Duration) -> Option<Duration> {
    let n = value.trim().parse::<u32>().ok().filter(|n| *n > 0)?;
    Some(unit * n)
}
