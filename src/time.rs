//! Time source substrate.
//!
//! The executor's poll cadence and a node's per-execution timeout both go
//! through a small [`Clock`] trait instead of calling `tokio::time` directly.
//! That keeps the scheduling loop testable under `tokio::time::pause` without
//! the core needing to know it's running inside a paused runtime.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// A monotonic time source with a cancellable sleep.
pub trait Clock: Send + Sync {
    /// The current instant, per this clock's notion of time.
    fn now(&self) -> Instant;

    /// Sleep for `dur`. Cancellable by dropping the returned future, same as
    /// `tokio::time::sleep`.
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// The default clock, backed directly by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(dur))
    }
}
