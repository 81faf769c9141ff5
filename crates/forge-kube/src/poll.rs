//! Deadline-bounded, cancellable polling

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Why a poll stopped without the condition being met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStop {
    /// The deadline passed; carries how long the poll ran
    TimedOut(Duration),
    Cancelled,
}

/// Paces repeated checks until a deadline
///
/// The caller checks its condition, then awaits [`Poller::tick`] before the
/// next check. The final tick before the deadline is shortened so one last
/// check happens right at the deadline.
pub struct Poller<'a> {
    interval: Duration,
    started: Instant,
    deadline: Instant,
    cancel: &'a CancellationToken,
}

impl<'a> Poller<'a> {
    pub fn new(interval: Duration, timeout: Duration, cancel: &'a CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            interval,
            started,
            deadline: started + timeout,
            cancel,
        }
    }

    /// Pull the deadline in to at most `timeout` from now
    pub fn tighten(&mut self, timeout: Duration) {
        self.deadline = self.deadline.min(Instant::now() + timeout);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wait until the next check is due
    pub async fn tick(&self) -> Result<(), PollStop> {
        if self.cancel.is_cancelled() {
            return Err(PollStop::Cancelled);
        }
        let now = Instant::now();
        if now >= self.deadline {
            return Err(PollStop::TimedOut(self.elapsed()));
        }
        let pause = self.interval.min(self.deadline - now);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PollStop::Cancelled),
            _ = sleep(pause) => Ok(()),
        }
    }
}
