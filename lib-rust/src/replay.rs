//! Replay-buffer mode: save the buffer shortly after trigger events stop
//! happening.

use crate::{
    capture::{Region, ScreenCapture},
    config::ReplayConfig,
    error::Result,
    monitor::EventMonitor,
    obs::{ControlGuard, RecorderControl},
    recognizer::TextRecognizer,
    ticker::{CancelToken, Ticker},
    trigger::TriggerSet,
};
use std::time::{Duration, Instant};

/// Coalesces bursts of triggers into one action once things go quiet.
#[derive(Clone, Debug)]
pub struct Debounce {
    delay: Duration,
    last_trigger: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_trigger: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.last_trigger = Some(now);
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    /// True (once) when more than `delay` has passed since the last trigger.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.last_trigger {
            Some(last) if now.saturating_duration_since(last) > self.delay => {
                self.last_trigger = None;
                true
            }
            _ => false,
        }
    }
}

pub struct ReplayTriggerLoop<C, R> {
    monitor: EventMonitor<C, R>,
    triggers: TriggerSet,
    debounce: Debounce,
    period: Duration,
    debug_ticks: bool,
}

impl<C: ScreenCapture, R: TextRecognizer> ReplayTriggerLoop<C, R> {
    pub fn new(monitor: EventMonitor<C, R>, triggers: TriggerSet, config: &ReplayConfig) -> Self {
        Self {
            monitor,
            triggers,
            debounce: Debounce::new(config.debounce()),
            period: config.period(),
            debug_ticks: false,
        }
    }

    /// Log the duration of every tick.
    pub fn debug_ticks(mut self, enabled: bool) -> Self {
        self.debug_ticks = enabled;
        self
    }

    /// Start the replay buffer and poll until `cancel` is set.
    ///
    /// Failing to start the buffer is fatal. Whatever the exit path, the
    /// buffer is stopped and the connection closed.
    pub fn run<O: RecorderControl>(&mut self, control: &mut O, cancel: &CancelToken) -> Result<()> {
        let mut guard = ControlGuard::with_replay_buffer(control);
        log::info!("starting replay buffer monitor, triggers: {}", self.triggers);
        guard
            .control()
            .start_replay_buffer()
            .map_err(|e| e.context("could not start replay buffer"))?;

        let mut ticker = Ticker::new(self.period);
        while !cancel.is_cancelled() {
            let now = ticker.begin();
            let saved = self.tick(guard.control(), now);
            if self.debug_ticks {
                log::debug!("[replay] tick took {:?}, saved: {}", now.elapsed(), saved);
            }
            ticker.finish(cancel);
        }

        log::info!("stopping replay buffer monitor, {} ticks overran", ticker.overruns());
        Ok(())
    }

    /// One iteration. Returns whether the replay buffer was saved.
    pub fn tick<O: RecorderControl>(&mut self, control: &mut O, now: Instant) -> bool {
        match self.monitor.detect(Region::PlayerEvent) {
            Ok(events) => {
                if let Some(event) = self.triggers.first_match(&events) {
                    log::debug!("trigger {} at {:?}", event, now);
                    self.debounce.trigger(now);
                }
            }
            Err(e) => log::warn!("event detection failed: {}", e),
        }

        if !self.debounce.fire(now) {
            return false;
        }
        log::info!("event delay passed, saving replay buffer");
        if let Err(e) = control.save_replay_buffer() {
            log::error!("{}", e.context("saving replay buffer"));
        }
        true
    }

    pub fn monitor(&self) -> &EventMonitor<C, R> {
        &self.monitor
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_secs(15));
        assert!(!debounce.fire(start));

        debounce.trigger(start);
        assert!(!debounce.fire(start + Duration::from_secs(15)));
        assert!(debounce.fire(start + Duration::from_secs(16)));
        assert!(!debounce.fire(start + Duration::from_secs(17)));
        assert_eq!(debounce.last_trigger(), None);
    }

    #[test]
    fn new_trigger_restarts_the_delay() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_secs(10));
        debounce.trigger(start);
        debounce.trigger(start + Duration::from_secs(8));
        assert!(!debounce.fire(start + Duration::from_secs(12)));
        assert!(debounce.fire(start + Duration::from_secs(19)));
    }
}
