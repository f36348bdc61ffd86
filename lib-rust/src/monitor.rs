use crate::{
    capture::{Region, ScreenCapture},
    error::Result,
    events::GameEvent,
    recognizer::{detect_events, TextRecognizer},
};

/// Screen capture plus OCR: "what does the HUD say in this region right now".
pub struct EventMonitor<C, R> {
    capture: C,
    recognizer: R,
}

impl<C: ScreenCapture, R: TextRecognizer> EventMonitor<C, R> {
    pub fn new(capture: C, recognizer: R) -> Self {
        Self {
            capture,
            recognizer,
        }
    }

    /// Grab `region` and classify whatever text is in it.
    pub fn detect(&mut self, region: Region) -> Result<Vec<GameEvent>> {
        let image = self
            .capture
            .grab(region)
            .map_err(|e| e.context(format!("capturing {}", region)))?;
        let events = detect_events(&mut self.recognizer, &image)?;
        for event in &events {
            log::debug!("[{}] detected {}", region, event);
        }
        Ok(events)
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }
}
