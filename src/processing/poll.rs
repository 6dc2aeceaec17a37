//! Fixed-step polling with optional timeout
//!
//! Used for both the server readiness probe and the active measurement
//! probe: same loop, different target and success predicate.

use std::thread;
use std::time::{Duration, Instant};

/// Why a poll loop gave up
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollError<E: std::error::Error + 'static> {
    /// Bounded poll ran out of time without a successful attempt
    #[error("polling timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    /// Target failed with an error that is not retryable
    #[error("polling aborted: {0}")]
    Aborted(#[source] E),
}

/// Repeatedly invoke a target until its result satisfies a predicate
pub struct PollLoop<'a, E> {
    step: Duration,
    timeout: Option<Duration>,
    ignorable: Box<dyn Fn(&E) -> bool + 'a>,
    on_step: Option<Box<dyn FnMut(u32) + 'a>>,
}

impl<'a, E: std::error::Error + 'static> PollLoop<'a, E> {
    /// Poll forever with `step` between attempts; every error aborts
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            timeout: None,
            ignorable: Box::new(|_| false),
            on_step: None,
        }
    }

    /// Give up after `timeout`. `None` polls forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry instead of aborting on errors matching `predicate`
    pub fn ignoring(mut self, predicate: impl Fn(&E) -> bool + 'a) -> Self {
        self.ignorable = Box::new(predicate);
        self
    }

    /// Called with the retry number before each retry
    pub fn on_step(mut self, callback: impl FnMut(u32) + 'a) -> Self {
        self.on_step = Some(Box::new(callback));
        self
    }

    /// Run until `check_success` accepts a result of `target`
    pub fn run<T>(
        mut self,
        mut target: impl FnMut() -> Result<T, E>,
        mut check_success: impl FnMut(&T) -> bool,
    ) -> Result<T, PollError<E>> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            match target() {
                Ok(value) if check_success(&value) => return Ok(value),
                Ok(_) => {}
                Err(error) if (self.ignorable)(&error) => {
                    tracing::debug!(%error, "ignoring retryable polling error");
                }
                Err(error) => return Err(PollError::Aborted(error)),
            }

            if let Some(timeout) = self.timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(PollError::Timeout { elapsed });
                }
            }

            attempt += 1;
            if let Some(on_step) = self.on_step.as_mut() {
                on_step(attempt);
            }
            thread::sleep(self.step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    enum ProbeError {
        #[error("connection refused")]
        Refused,
        #[error("fatal")]
        Fatal,
    }

    const STEP: Duration = Duration::from_millis(1);

    #[test]
    fn test_poll_forever_returns_success_value() {
        let calls = Cell::new(0);
        let result = PollLoop::new(STEP).run(
            || {
                calls.set(calls.get() + 1);
                Ok::<_, ProbeError>(calls.get())
            },
            |value| *value == 5,
        );
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn test_poll_forever_retries_ignorable_errors() {
        let calls = Cell::new(0);
        let result = PollLoop::new(STEP)
            .ignoring(|error| *error == ProbeError::Refused)
            .run(
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 4 {
                        Err(ProbeError::Refused)
                    } else {
                        Ok(200u16)
                    }
                },
                |status| *status == 200,
            );
        assert_eq!(result.unwrap(), 200);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_other_errors_abort_immediately() {
        let calls = Cell::new(0);
        let result = PollLoop::new(STEP)
            .ignoring(|error| *error == ProbeError::Refused)
            .run(
                || {
                    calls.set(calls.get() + 1);
                    Err::<u16, _>(ProbeError::Fatal)
                },
                |_| true,
            );
        assert_eq!(result, Err(PollError::Aborted(ProbeError::Fatal)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_timeout_shorter_than_needed_fails() {
        let result = PollLoop::new(Duration::from_millis(5))
            .with_timeout(Some(Duration::from_millis(20)))
            .run(|| Ok::<_, ProbeError>(500u16), |status| *status == 200);
        match result {
            Err(PollError::Timeout { elapsed }) => assert!(elapsed >= Duration::from_millis(20)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_swallows_ignorable_errors_until_deadline() {
        let result = PollLoop::new(STEP)
            .with_timeout(Some(Duration::from_millis(10)))
            .ignoring(|_| true)
            .run(|| Err::<u16, _>(ProbeError::Refused), |_| true);
        assert!(matches!(result, Err(PollError::Timeout { .. })));
    }

    #[test]
    fn test_on_step_counts_retries() {
        let mut steps = Vec::new();
        let calls = Cell::new(0);
        let result = PollLoop::new(STEP)
            .on_step(|attempt| steps.push(attempt))
            .run(
                || {
                    calls.set(calls.get() + 1);
                    Ok::<_, ProbeError>(calls.get())
                },
                |value| *value == 3,
            );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(steps, vec![1, 2]);
    }
}
