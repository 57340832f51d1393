//! Shared helpers for unit and integration tests.
//!
//! Tests call [`init_test_logging`] first, then bracket their body with
//! [`test_phase!`](crate::test_phase) and [`test_complete!`](crate::test_complete).
//! [`assert_with_log!`](crate::assert_with_log) logs expected/actual through
//! `tracing` before panicking so failures show up in the captured output of
//! concurrent tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a test-writer `fmt` subscriber once per process.
///
/// The level comes from `RUST_LOG` when set, `info` otherwise.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Logs the start of a named test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Logs the successful end of a named test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Asserts a condition, logging the expectation first when it fails.
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
