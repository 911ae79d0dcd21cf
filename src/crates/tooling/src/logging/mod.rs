//! Logging setup and timing helpers built on `tracing`

use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (e.g. `"info"` or
/// `"routegraph_core=debug"`) is used. Returns `false` when a subscriber was
/// already installed, which makes the call safe to repeat from tests.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Subscriber for tests: writes through the test harness capture
pub fn init_test_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init()
        .is_ok()
}

/// RAII guard that logs scope entry, and exit with the elapsed time
///
/// ```rust
/// use tooling::logging::LogGuard;
///
/// fn checkpoint() {
///     let _guard = LogGuard::new("checkpoint");
///     // exit is logged when the guard drops
/// }
/// ```
pub struct LogGuard {
    name: String,
    start: Instant,
}

impl LogGuard {
    /// Start timing a named scope
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(scope = %name, "entering");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Time since the guard was created
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        debug!(scope = %self.name, elapsed = %format_duration(self.start.elapsed()), "exiting");
    }
}

/// Compact human-readable duration
///
/// ```rust
/// use tooling::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_micros(250)), "250μs");
/// assert_eq!(format_duration(Duration::from_millis(40)), "40ms");
/// assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros < 1_000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", micros / 1_000)
    } else if micros < 60_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else {
        let seconds = micros / 1_000_000;
        format!("{}m{}s", seconds / 60, seconds % 60)
    }
}
