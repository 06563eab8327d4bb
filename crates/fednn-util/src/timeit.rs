//! Timing macros for the command-line tools.

use std::{fmt, time::Duration};

/// Prints a duration with a unit adapted to its magnitude.
pub struct DisplayDuration(pub Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration_ns = self.0.as_nanos();
        if duration_ns < 1_000_u128 {
            write!(f, "{duration_ns} ns")
        } else if duration_ns < 1_000_000_u128 {
            write!(f, "{} μs", (duration_ns + 500) / 1_000)
        } else {
            let duration_ms_times_10 = (duration_ns + 50_000) / (100_000);
            write!(f, "{} ms", (duration_ms_times_10 as f64) / 10.0)
        }
    }
}

/// Evaluates `$code`, prints how long it took under `$name`, and returns the
/// value of `$code`.
#[macro_export]
macro_rules! timeit {
    ($name:expr, $code:expr) => {{
        let start = std::time::Instant::now();
        let r = $code;
        println!(
            "⏱  {}: {}",
            $name,
            $crate::timeit::DisplayDuration(start.elapsed())
        );
        r
    }};
}

#[cfg(test)]
mod tests {
    use super::DisplayDuration;
    use std::time::Duration;

    #[test]
    fn units() {
        assert_eq!(DisplayDuration(Duration::from_nanos(12)).to_string(), "12 ns");
        assert_eq!(DisplayDuration(Duration::from_micros(12)).to_string(), "12 μs");
        assert_eq!(DisplayDuration(Duration::from_millis(12)).to_string(), "12 ms");
        assert_eq!(
            DisplayDuration(Duration::from_micros(12_345)).to_string(),
            "12.3 ms"
        );
    }

    #[test]
    fn macro_returns_value() {
        let v = crate::timeit!("addition", 2 + 3);
        assert_eq!(v, 5);
    }
}
