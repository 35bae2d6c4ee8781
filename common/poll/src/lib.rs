// Licensed under the Apache-2.0 license

//! Bounded polling for hardware handshakes.
//!
//! Every wait in this workspace goes through here: a fallible predicate is
//! retried at a fixed delay until it holds or a deadline passes. There is no
//! unbounded variant; a device that never answers surfaces as
//! [`PollError::Timeout`] instead of a hang.

use std::num::NonZeroU64;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    #[error("{what} not reached within {timeout:?} ({polls} polls)")]
    Timeout {
        what: &'static str,
        timeout: Duration,
        polls: u64,
    },
    #[error("poll predicate failed: {0}")]
    Predicate(#[source] E),
}

/// Poll policy: deadline, inter-poll delay, and optional progress logging.
///
/// The delay is matched to the signal being waited on. CSR acknowledgements
/// land within a handful of device clocks, so they get a sub-microsecond
/// delay; DMA completion takes orders of magnitude longer and is polled at a
/// coarser interval to keep the register channel quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub timeout: Duration,
    pub delay: Duration,
    pub progress_every: Option<NonZeroU64>,
}

impl Poller {
    pub const fn new(timeout: Duration, delay: Duration) -> Self {
        Self {
            timeout,
            delay,
            progress_every: None,
        }
    }

    /// Logs a debug line every `every` polls while waiting. Zero disables
    /// progress logging.
    pub const fn with_progress(mut self, every: u64) -> Self {
        self.progress_every = NonZeroU64::new(every);
        self
    }

    /// Retries `predicate` until it returns true. `what` names the awaited
    /// condition in progress lines and the timeout error.
    pub fn wait_for<E>(
        &self,
        what: &'static str,
        mut predicate: impl FnMut() -> Result<bool, E>,
    ) -> Result<(), PollError<E>>
    where
        E: std::error::Error + 'static,
    {
        let start = Instant::now();
        let mut polls: u64 = 0;
        loop {
            if predicate().map_err(PollError::Predicate)? {
                return Ok(());
            }
            polls += 1;
            if let Some(every) = self.progress_every {
                if polls % every.get() == 0 {
                    log::debug!(
                        "still waiting for {what}: {polls} polls, {:?} elapsed",
                        start.elapsed()
                    );
                }
            }
            if start.elapsed() >= self.timeout {
                return Err(PollError::Timeout {
                    what,
                    timeout: self.timeout,
                    polls,
                });
            }
            std::thread::sleep(self.delay);
        }
    }
}
