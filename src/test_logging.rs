//! Structured test logging for lock behavior.
//!
//! Captures typed, timestamped events during a test so that a failing
//! assertion can print the full history of grants, releases, and queue
//! movement that led up to it.
//!
//! # Overview
//!
//! - [`TestLogLevel`]: configurable verbosity levels
//! - [`TestEvent`]: typed events for lock operations
//! - [`TestLogger`]: captures and reports events with timestamps
//!
//! # Example
//!
//! ```ignore
//! use drainlock::test_logging::{TestEvent, TestLogLevel, TestLogger};
//!
//! let logger = TestLogger::new(TestLogLevel::Debug);
//! logger.log(TestEvent::SharedGranted { available: 2 });
//!
//! // On test completion, print the report.
//! println!("{}", logger.report());
//! ```

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Logging verbosity level for tests.
///
/// Levels are ordered from least to most verbose:
/// `Error < Warn < Info < Debug < Trace`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestLogLevel {
    /// Only errors and failures.
    Error,
    /// Warnings and above.
    Warn,
    /// General test progress.
    #[default]
    Info,
    /// Individual grants and releases.
    Debug,
    /// All events including queue movement.
    Trace,
}

impl TestLogLevel {
    /// Returns a human-readable name for the level.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Returns the level from the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TestLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TestLogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

/// A typed event observed during a lock test.
#[derive(Debug, Clone)]
pub enum TestEvent {
    /// A shared token was granted.
    SharedGranted {
        /// Unclaimed tokens after the grant.
        available: usize,
    },
    /// A shared token was returned.
    SharedReleased {
        /// Unclaimed tokens after the release.
        available: usize,
    },
    /// Exclusive ownership was granted.
    ExclusiveGranted,
    /// Exclusive ownership was released.
    ExclusiveReleased,
    /// A request entered the wait queue.
    WaiterEnqueued {
        /// Tokens the request is waiting for.
        count: usize,
    },
    /// A waiting request was cancelled or dropped.
    WaiterCancelled,
    /// A custom event with a category.
    Custom {
        /// Event category for filtering.
        category: &'static str,
        /// Event description.
        message: String,
    },
    /// An error-level event.
    Error {
        /// Event category for filtering.
        category: &'static str,
        /// Event description.
        message: String,
    },
    /// A warning-level event.
    Warn {
        /// Event category for filtering.
        category: &'static str,
        /// Event description.
        message: String,
    },
}

impl TestEvent {
    /// Returns the level at which this event is logged.
    #[must_use]
    pub const fn level(&self) -> TestLogLevel {
        match self {
            Self::Error { .. } => TestLogLevel::Error,
            Self::Warn { .. } => TestLogLevel::Warn,
            Self::ExclusiveGranted | Self::ExclusiveReleased | Self::Custom { .. } => {
                TestLogLevel::Info
            }
            Self::SharedGranted { .. } | Self::SharedReleased { .. } => TestLogLevel::Debug,
            Self::WaiterEnqueued { .. } | Self::WaiterCancelled => TestLogLevel::Trace,
        }
    }
}

impl std::fmt::Display for TestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedGranted { available } => {
                write!(f, "shared granted: available={available}")
            }
            Self::SharedReleased { available } => {
                write!(f, "shared released: available={available}")
            }
            Self::ExclusiveGranted => write!(f, "exclusive granted"),
            Self::ExclusiveReleased => write!(f, "exclusive released"),
            Self::WaiterEnqueued { count } => write!(f, "waiter enqueued: count={count}"),
            Self::WaiterCancelled => write!(f, "waiter cancelled"),
            Self::Custom { category, message } => write!(f, "[{category}] {message}"),
            Self::Error { category, message } => write!(f, "ERROR [{category}] {message}"),
            Self::Warn { category, message } => write!(f, "WARN [{category}] {message}"),
        }
    }
}

/// A timestamped event record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Time since logger creation.
    pub elapsed: Duration,
    /// The event that occurred.
    pub event: TestEvent,
}

/// Test logger that captures typed events with timestamps.
#[derive(Debug)]
pub struct TestLogger {
    /// Minimum level to capture.
    level: TestLogLevel,
    /// Captured events.
    events: Mutex<Vec<LogRecord>>,
    /// Start time for elapsed calculation.
    start_time: Instant,
    /// Whether to print events immediately.
    verbose: bool,
}

impl TestLogger {
    /// Creates a new logger with the specified level.
    #[must_use]
    pub fn new(level: TestLogLevel) -> Self {
        Self {
            level,
            events: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            verbose: level >= TestLogLevel::Trace,
        }
    }

    /// Creates a logger using the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(TestLogLevel::from_env())
    }

    /// Returns the configured log level.
    #[must_use]
    pub fn level(&self) -> TestLogLevel {
        self.level
    }

    /// Returns the elapsed time since logger creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns whether the logger captures events at the given level.
    #[must_use]
    pub fn should_log(&self, level: TestLogLevel) -> bool {
        level <= self.level
    }

    /// Logs an event if it meets the configured level.
    pub fn log(&self, event: TestEvent) {
        let event_level = event.level();
        if !self.should_log(event_level) {
            return;
        }

        let elapsed = self.start_time.elapsed();

        if self.verbose {
            eprintln!(
                "[{:>10.3}ms] [{:>5}] {}",
                elapsed.as_secs_f64() * 1000.0,
                event_level.name(),
                &event
            );
        }

        let record = LogRecord { elapsed, event };
        self.events.lock().expect("lock poisoned").push(record);
    }

    /// Logs a custom event.
    pub fn custom(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Custom {
            category,
            message: message.into(),
        });
    }

    /// Logs an error event.
    pub fn error(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Error {
            category,
            message: message.into(),
        });
    }

    /// Logs a warning event.
    pub fn warn(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Warn {
            category,
            message: message.into(),
        });
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Returns a snapshot of all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<LogRecord> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Generates a detailed report of all captured events.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self) -> String {
        let events = self.events.lock().expect("lock poisoned").clone();
        let mut report = String::new();

        let _ = writeln!(report, "=== Test Event Log ({} events) ===", events.len());
        for record in &events {
            let _ = writeln!(
                report,
                "[{:>10.3}ms] [{:>5}] {}",
                record.elapsed.as_secs_f64() * 1000.0,
                record.event.level().name(),
                record.event
            );
        }
        report
    }
}

/// Log a custom event to a test logger.
///
/// # Example
///
/// ```ignore
/// test_log!(logger, "setup", "Creating lock with capacity {}", n);
/// ```
#[macro_export]
macro_rules! test_log {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Custom {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Log an error event to a test logger.
#[macro_export]
macro_rules! test_error {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Error {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Log a warning event to a test logger.
#[macro_export]
macro_rules! test_warn {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Warn {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Assert a condition, printing the full log on failure.
///
/// # Example
///
/// ```ignore
/// assert_log!(logger, result.is_ok(), "Expected success, got {:?}", result);
/// ```
#[macro_export]
macro_rules! assert_log {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!("assertion failed: {}", stringify!($cond));
        }
    };
    ($logger:expr, $cond:expr, $($arg:tt)*) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!($($arg)*);
        }
    };
}

/// Assert equality, printing the full log on failure.
#[macro_export]
macro_rules! assert_eq_log {
    ($logger:expr, $left:expr, $right:expr) => {
        if $left != $right {
            eprintln!("{}", $logger.report());
            panic!(
                "assertion failed: `(left == right)`\n  left: {:?}\n right: {:?}",
                $left, $right
            );
        }
    };
    ($logger:expr, $left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            eprintln!("{}", $logger.report());
            panic!(
                "assertion failed: `(left == right)`\n  left: {:?}\n right: {:?}\n{}",
                $left, $right, format!($($arg)*)
            );
        }
    };
}

/// Phase tracking macro for structured test logging.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Completion tracking macro for structured test logging.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Assertion with logging for better test output.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_ordering() {
        assert!(TestLogLevel::Error < TestLogLevel::Warn);
        assert!(TestLogLevel::Warn < TestLogLevel::Info);
        assert!(TestLogLevel::Info < TestLogLevel::Debug);
        assert!(TestLogLevel::Debug < TestLogLevel::Trace);
    }

    #[test]
    fn log_level_from_str() {
        assert_eq!("error".parse(), Ok(TestLogLevel::Error));
        assert_eq!("ERROR".parse(), Ok(TestLogLevel::Error));
        assert_eq!("warning".parse(), Ok(TestLogLevel::Warn));
        assert_eq!("info".parse(), Ok(TestLogLevel::Info));
        assert_eq!("debug".parse(), Ok(TestLogLevel::Debug));
        assert_eq!("trace".parse(), Ok(TestLogLevel::Trace));
        assert_eq!("invalid".parse::<TestLogLevel>(), Err(()));
    }

    #[test]
    fn logger_filters_below_level() {
        let logger = TestLogger::new(TestLogLevel::Info);
        logger.log(TestEvent::ExclusiveGranted);
        logger.log(TestEvent::WaiterCancelled); // Trace: filtered
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn logger_captures_in_order() {
        let logger = TestLogger::new(TestLogLevel::Trace);
        logger.log(TestEvent::SharedGranted { available: 1 });
        logger.log(TestEvent::SharedReleased { available: 2 });
        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].event,
            TestEvent::SharedGranted { available: 1 }
        ));
        assert!(events[0].elapsed <= events[1].elapsed);
    }

    #[test]
    fn report_includes_all_events() {
        let logger = TestLogger::new(TestLogLevel::Debug);
        logger.custom("setup", "capacity 3");
        logger.log(TestEvent::ExclusiveGranted);
        let report = logger.report();
        assert!(report.contains("2 events"));
        assert!(report.contains("[setup] capacity 3"));
        assert!(report.contains("exclusive granted"));
    }

    #[test]
    fn event_display_and_levels() {
        let granted = TestEvent::SharedGranted { available: 2 };
        assert_eq!(granted.level(), TestLogLevel::Debug);
        assert!(granted.to_string().contains("available=2"));

        let err = TestEvent::Error {
            category: "drain",
            message: "leaked".into(),
        };
        assert_eq!(err.level(), TestLogLevel::Error);
        assert!(err.to_string().contains("ERROR [drain] leaked"));
    }
}
