//! Full-session mode: record each match from start screen to end screen,
//! then cut a highlights video from the recording.

use crate::{
    capture::{Region, ScreenCapture},
    config::SessionConfig,
    error::{Error, Result},
    events::EventType,
    monitor::EventMonitor,
    obs::{ControlGuard, RecorderControl},
    pipeline::{latest_recording, RecordingProcessor},
    recognizer::TextRecognizer,
    ticker::{CancelToken, Ticker},
    trigger::TriggerSet,
};
use std::{
    fmt::{Display, Formatter},
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    WaitingForGame,
    Recording,
    ProcessingRecording,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::WaitingForGame => "waiting for game",
            SessionState::Recording => "recording",
            SessionState::ProcessingRecording => "processing recording",
        };
        f.write_str(name)
    }
}

pub struct GameSession<C, R, P> {
    monitor: EventMonitor<C, R>,
    triggers: TriggerSet,
    processor: P,
    state: SessionState,
    /// Recording ticks since the last start; picks the region to watch
    recording_ticks: u64,
    period: Duration,
    debug_ticks: bool,
}

impl<C, R, P> GameSession<C, R, P>
where
    C: ScreenCapture,
    R: TextRecognizer,
    P: RecordingProcessor,
{
    pub fn new(
        monitor: EventMonitor<C, R>,
        triggers: TriggerSet,
        processor: P,
        config: &SessionConfig,
    ) -> Self {
        Self {
            monitor,
            triggers,
            processor,
            state: SessionState::WaitingForGame,
            recording_ticks: 0,
            period: config.period(),
            debug_ticks: false,
        }
    }

    /// Log the state and duration of every tick.
    pub fn debug_ticks(mut self, enabled: bool) -> Self {
        self.debug_ticks = enabled;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn monitor(&self) -> &EventMonitor<C, R> {
        &self.monitor
    }

    /// Step the state machine once per period until `cancel` is set or a
    /// step fails. The recorder is disconnected on every way out.
    pub fn run<O: RecorderControl>(&mut self, control: &mut O, cancel: &CancelToken) -> Result<()> {
        let mut guard = ControlGuard::new(control);
        log::info!("watching for a game, triggers: {}", self.triggers);

        let mut ticker = Ticker::new(self.period);
        while !cancel.is_cancelled() {
            let started = ticker.begin();
            let state = self.state;
            self.step(guard.control())?;
            if self.debug_ticks {
                log::debug!(
                    "[session] {} tick took {:?}",
                    state,
                    started.elapsed()
                );
            }
            ticker.finish(cancel);
        }

        log::info!(
            "session stopped in state: {} ({} ticks overran)",
            self.state,
            ticker.overruns()
        );
        Ok(())
    }

    /// Run one tick of the state machine.
    ///
    /// Only a recording that cannot be found after a stop is an error;
    /// everything else is logged and retried on the next tick.
    pub fn step<O: RecorderControl>(&mut self, control: &mut O) -> Result<()> {
        match self.state {
            SessionState::WaitingForGame => {
                if !self.saw(Region::GameStart, &[EventType::GameStart]) {
                    return Ok(());
                }
                log::info!("game started, starting recording");
                match control.start_recording() {
                    Ok(()) => {
                        self.recording_ticks = 0;
                        self.state = SessionState::Recording;
                    }
                    Err(e) => log::error!("{}", e.context("could not start recording")),
                }
            }

            SessionState::Recording => {
                let region = if self.recording_ticks % 2 == 0 {
                    Region::GameEnd
                } else {
                    Region::Victory
                };
                self.recording_ticks += 1;
                if !self.saw(region, &[EventType::GameEnd, EventType::Victory]) {
                    return Ok(());
                }
                log::info!("game over, stopping recording");
                match control.stop_recording() {
                    Ok(()) => self.state = SessionState::ProcessingRecording,
                    Err(e) => log::error!("{}", e.context("could not stop recording")),
                }
            }

            SessionState::ProcessingRecording => {
                let dir = control
                    .record_directory()
                    .map_err(|e| e.context("querying the record directory"))?;
                let recording = latest_recording(&dir)?.ok_or_else(|| {
                    Error::from(format!("no recording found in {}", dir.display()))
                })?;

                log::info!("processing {}", recording.display());
                match self.processor.process(
                    &recording,
                    &self.triggers,
                    self.monitor.recognizer_mut(),
                ) {
                    Ok(Some(output)) => log::info!("highlights written to {}", output.display()),
                    Ok(None) => log::info!("no highlights in {}", recording.display()),
                    Err(e) => log::error!(
                        "{}",
                        e.context(format!("processing {}", recording.display()))
                    ),
                }
                self.state = SessionState::WaitingForGame;
            }
        }
        Ok(())
    }

    /// Whether `region` currently shows one of `wanted`. Capture and
    /// recognition failures count as "no".
    fn saw(&mut self, region: Region, wanted: &[EventType]) -> bool {
        match self.monitor.detect(region) {
            Ok(events) => events.iter().any(|e| wanted.contains(&e.event_type)),
            Err(e) => {
                log::warn!("event detection failed: {}", e);
                false
            }
        }
    }
}
