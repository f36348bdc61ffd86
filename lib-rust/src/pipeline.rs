//! Post-processing of a finished recording: probe, extract, cluster,
//! assemble.

use crate::{
    assembler::{assemble, cluster_with, ClusterParams},
    capture::{Rect, Region},
    config::Config,
    error::{Error, Result},
    extractor::extract,
    ffmpeg::Transcoder,
    recognizer::TextRecognizer,
    trigger::TriggerSet,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Turns a finished recording into a highlights video.
pub trait RecordingProcessor {
    /// Returns the highlights file, or `None` when nothing was worth keeping.
    fn process(
        &mut self,
        recording: &Path,
        triggers: &TriggerSet,
        recognizer: &mut dyn TextRecognizer,
    ) -> Result<Option<PathBuf>>;
}

/// The ffmpeg-backed [`RecordingProcessor`].
#[derive(Clone, Debug)]
pub struct HighlightPipeline {
    pub transcoder: Transcoder,
    /// Player-event region, calibrated on 1920x1080
    pub region: Rect,
    pub cluster: ClusterParams,
}

impl HighlightPipeline {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transcoder: Transcoder::from_config(config),
            region: config.regions.rect(Region::PlayerEvent),
            cluster: ClusterParams::default(),
        }
    }
}

impl RecordingProcessor for HighlightPipeline {
    fn process(
        &mut self,
        recording: &Path,
        triggers: &TriggerSet,
        recognizer: &mut dyn TextRecognizer,
    ) -> Result<Option<PathBuf>> {
        process_recording(recording, triggers, recognizer, self)
    }
}

/// Probe `path`, find the trigger events in it, and splice the windows
/// around them into `Highlights_<stem>.mkv`.
pub fn process_recording<R: TextRecognizer + ?Sized>(
    path: &Path,
    triggers: &TriggerSet,
    recognizer: &mut R,
    pipeline: &HighlightPipeline,
) -> Result<Option<PathBuf>> {
    let transcoder = &pipeline.transcoder;
    let metadata = transcoder
        .probe(path)
        .map_err(|e| e.context(format!("probing {}", path.display())))?;
    log::info!(
        "[pipeline] {}: {:.1}s at {:.2} fps, {}x{}, recorded {} to {}",
        path.display(),
        metadata.duration,
        metadata.framerate,
        metadata.width,
        metadata.height,
        metadata.start_time,
        metadata.end_time
    );

    let timestamps = extract(&metadata, recognizer, triggers, transcoder, pipeline.region)?;
    log::info!("[pipeline] {} trigger frames", timestamps.len());

    let windows = cluster_with(&timestamps, pipeline.cluster);
    assemble(&metadata, &windows, transcoder)
}

/// The newest regular file in `dir`, by creation time (modification time
/// where the platform has no creation time).
pub fn latest_recording(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::from(e).context(format!("reading {}", dir.display())))?;

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let created = metadata.created().or_else(|_| metadata.modified())?;
        if latest.as_ref().map_or(true, |(newest, _)| created > *newest) {
            latest = Some((created, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, thread, time::Duration};

    #[test]
    fn latest_recording_picks_newest_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        File::create(dir.path().join("2024-05-06 20-00-00.mkv"))?;
        thread::sleep(Duration::from_millis(20));
        fs::create_dir(dir.path().join("subdir"))?;
        File::create(dir.path().join("2024-05-06 21-00-00.mkv"))?;

        let latest = latest_recording(dir.path())?;
        assert_eq!(latest, Some(dir.path().join("2024-05-06 21-00-00.mkv")));
        Ok(())
    }

    #[test]
    fn latest_recording_of_empty_dir_is_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("only-a-dir"))?;
        assert_eq!(latest_recording(dir.path())?, None);
        Ok(())
    }

    #[test]
    fn latest_recording_of_missing_dir_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(latest_recording(&dir.path().join("missing")).is_err());
        Ok(())
    }
}
