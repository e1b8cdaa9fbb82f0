//! Condition polling
//!
//! A [`Waiter`] re-evaluates a probe until it yields a value or the timeout
//! elapses. It replaces fixed sleeps: a condition that already holds returns
//! after one evaluation, and a condition that never holds fails at the
//! deadline with the awaited condition and the last probe error attached.
//!
//! The loop is check, sleep, recheck. Sleeps are clamped to the remaining
//! budget and one last probe runs at the deadline, so a timeout is raised no
//! earlier than `timeout` and no later than `timeout + interval` (plus the
//! cost of a single probe).

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};

/// Outcome of one probe: `Some` satisfies the wait, `None` means not yet
pub type Probe<T> = E2eResult<Option<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    timeout: Duration,
    interval: Duration,
}

impl Waiter {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms), Duration::from_millis(interval_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Same interval, different timeout
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Await `probe` until it yields a value.
    ///
    /// Probe errors count as "not yet"; the most recent one is reported if
    /// the wait times out.
    pub async fn until<T, F, Fut>(&self, condition: &str, mut probe: F) -> E2eResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Probe<T>>,
    {
        let start = Instant::now();
        let mut tracker = Attempts::new(condition);

        loop {
            if let Some(value) = tracker.record(probe().await) {
                debug!("Condition met after {:?}: {}", start.elapsed(), condition);
                return Ok(value);
            }
            match self.next_sleep(start) {
                Some(pause) => tokio::time::sleep(pause).await,
                None => return Err(tracker.timed_out(start.elapsed())),
            }
        }
    }

    /// Blocking variant for synchronous probes. Sleeps the calling thread.
    pub fn until_blocking<T, F>(&self, condition: &str, mut probe: F) -> E2eResult<T>
    where
        F: FnMut() -> Probe<T>,
    {
        let start = Instant::now();
        let mut tracker = Attempts::new(condition);

        loop {
            if let Some(value) = tracker.record(probe()) {
                debug!("Condition met after {:?}: {}", start.elapsed(), condition);
                return Ok(value);
            }
            match self.next_sleep(start) {
                Some(pause) => std::thread::sleep(pause),
                None => return Err(tracker.timed_out(start.elapsed())),
            }
        }
    }

    /// Time to sleep before the next probe, or `None` once the deadline has passed
    fn next_sleep(&self, start: Instant) -> Option<Duration> {
        let elapsed = start.elapsed();
        if elapsed >= self.timeout {
            return None;
        }
        Some(self.interval.min(self.timeout - elapsed))
    }
}

/// Bookkeeping shared by both loops
struct Attempts<'a> {
    condition: &'a str,
    count: usize,
    last_error: Option<String>,
}

impl<'a> Attempts<'a> {
    fn new(condition: &'a str) -> Self {
        Self {
            condition,
            count: 0,
            last_error: None,
        }
    }

    fn record<T>(&mut self, outcome: Probe<T>) -> Option<T> {
        self.count += 1;
        match outcome {
            Ok(Some(value)) => Some(value),
            Ok(None) => None,
            Err(e) => {
                trace!("Probe {} for '{}' failed: {}", self.count, self.condition, e);
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    fn timed_out(self, elapsed: Duration) -> E2eError {
        debug!("Gave up on '{}' after {} probes", self.condition, self.count);
        E2eError::TimeoutExceeded {
            condition: self.condition.to_string(),
            elapsed,
            last_error: self.last_error,
        }
    }
}
