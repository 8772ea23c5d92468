//! Exponential backoff around fallible operations.
//!
//! The n-th consecutive failure sleeps `factor * base^n` before the next
//! attempt. The counter resets after every success.

use std::{fmt::Display, time::Duration};

pub const DEFAULT_BASE: f64 = 2.0;
pub const DEFAULT_FACTOR: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

type BackoffHook = Box<dyn FnMut(&dyn Display, Duration)>;
type Sleeper = Box<dyn FnMut(Duration)>;

pub struct ExponentialBackoff {
    base: f64,
    factor: Duration,
    maximum: u32,
    count: u32,
    on_backoff: Option<BackoffHook>,
    sleeper: Sleeper,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_FACTOR, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ExponentialBackoff {
    /// `maximum` counts attempts, so `maximum - 1` sleeps at most
    pub fn new(base: f64, factor: Duration, maximum: u32) -> Self {
        Self {
            base,
            factor,
            maximum: maximum.max(1),
            count: 0,
            on_backoff: None,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Called with the error and the delay before each sleep
    pub fn on_backoff(mut self, hook: impl FnMut(&dyn Display, Duration) + 'static) -> Self {
        self.on_backoff = Some(Box::new(hook));
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn next_delay(&self) -> Duration {
        self.factor.mul_f64(self.base.powi(self.count as i32))
    }

    /// Record a failure: sleep and return `Ok` while attempts remain,
    /// hand the error back once they are used up.
    pub fn trigger<E: Display>(&mut self, err: E) -> Result<(), E> {
        if self.count + 1 >= self.maximum {
            return Err(err);
        }

        let delay = self.next_delay();
        if let Some(hook) = self.on_backoff.as_mut() {
            hook(&err, delay);
        }
        (self.sleeper)(delay);
        self.count += 1;
        Ok(())
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempts run out.
    pub fn retry<T, E, F, R>(&mut self, mut op: F, is_retryable: R) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        loop {
            match op() {
                Ok(value) => {
                    self.reset();
                    return Ok(value);
                }
                Err(err) if is_retryable(&err) => self.trigger(err)?,
                Err(err) => return Err(err),
            }
        }
    }
}
