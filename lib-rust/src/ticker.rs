use crate::error::{Error, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Longest single sleep before re-checking for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared flag used to ask a polling loop to exit after its current iteration.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token when the process receives Ctrl-C or SIGTERM.
    pub fn cancel_on_ctrlc(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, stopping after the current iteration");
            token.cancel();
        })
        .map_err(Error::from_std)
    }

    /// Sleep for `duration`, waking early if the token is cancelled.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

/// Fixed-cadence cooperative tick.
///
/// The loop body's own cost is subtracted from the period. When a tick
/// overruns, the next one starts immediately; missed ticks are dropped and
/// never queued up.
#[derive(Clone, Debug)]
pub struct Ticker {
    period: Duration,
    started: Instant,
    overruns: u64,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: Instant::now(),
            overruns: 0,
        }
    }

    /// Mark the start of a tick and return its timestamp.
    pub fn begin(&mut self) -> Instant {
        self.started = Instant::now();
        self.started
    }

    /// Number of ticks whose work took longer than the period.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// How long to sleep after a tick whose work took `elapsed`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }

    /// Sleep out the rest of the current tick (interruptible by `cancel`).
    pub fn finish(&mut self, cancel: &CancelToken) {
        let elapsed = self.started.elapsed();
        if elapsed > self.period {
            self.overruns += 1;
            log::debug!(
                "tick overran by {:.3}s, starting next tick immediately",
                (elapsed - self.period).as_secs_f64()
            );
            return;
        }
        cancel.sleep(self.remaining(elapsed));
    }
}
