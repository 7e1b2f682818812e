//! Worker sizing policy: mapping batch size to a bounded worker count.

/// Upper bound on the worker pool regardless of batch size.
pub const MAX_WORKERS: usize = 10;

/// Determine the optimal worker count for a batch of `record_count` items.
///
/// Tiered heuristic on input size only - no system resource probing:
/// - up to 4 items: one worker per item (minimum 1, so a zero-item caller
///   still gets a valid 1-worker pool)
/// - 5 to 8 items: 4 workers
/// - 9 or more: capped at [`MAX_WORKERS`]
pub fn optimal_workers(record_count: usize) -> usize {
    if record_count <= 4 {
        record_count.max(1)
    } else if record_count <= 8 {
        4
    } else {
        MAX_WORKERS
    }
}

/// Parse a caller-supplied worker-count hint.
///
/// A present, parsable, positive value takes precedence; anything else
/// (absent, empty, unparsable, zero or negative) falls back to `default`,
/// which callers set to the heuristic's output for the batch at hand.
pub fn parse_max_workers(input: Option<&str>, default: usize) -> usize {
    match input.map(str::trim) {
        Some(raw) if !raw.is_empty() => match raw.parse::<i64>() {
            Ok(n) if n > 0 => n as usize,
            _ => default,
        },
        _ => default,
    }
}
