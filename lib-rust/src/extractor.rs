//! Find the moments in a finished recording where a trigger event was on
//! screen.

use crate::{
    capture::Rect,
    error::{Error, Result},
    ffmpeg::{Transcoder, VideoMetadata},
    png::PngRecordReader,
    recognizer::{detect_events, TextRecognizer},
    trigger::TriggerSet,
    util::format_seconds,
};
use image::ImageFormat;
use std::io::Read;

/// Frames sampled per second of recording.
pub const SAMPLES_PER_SECOND: u32 = 1;

/// Read sampled frames from `reader` (concatenated PNGs, one per
/// `1 / SAMPLES_PER_SECOND` seconds) and return the second offset of every
/// frame showing a trigger event. Duplicates are kept.
///
/// A frame the recognizer fails on is skipped; an undecodable stream is an
/// error.
pub fn scan_frames<Rd, R>(reader: Rd, recognizer: &mut R, triggers: &TriggerSet) -> Result<Vec<u32>>
where
    Rd: Read,
    R: TextRecognizer + ?Sized,
{
    let mut timestamps = Vec::new();
    if triggers.is_empty() {
        return Ok(timestamps);
    }

    let mut frames = PngRecordReader::new(reader);
    let mut frame_index: u32 = 0;
    while let Some(record) = frames.next_record()? {
        let second = frame_index / SAMPLES_PER_SECOND;
        frame_index += 1;

        let image = image::load_from_memory_with_format(&record, ImageFormat::Png)
            .map_err(|e| Error::from(e).context(format!("decoding frame {}", frame_index)))?
            .to_rgb8();
        let events = match detect_events(recognizer, &image) {
            Ok(events) => events,
            Err(e) => {
                log::warn!("[extract] skipping frame at {}: {}", second, e);
                continue;
            }
        };
        if let Some(event) = triggers.first_match(&events) {
            log::info!("[extract] {} at {}", event, format_seconds(second as f64));
            timestamps.push(second);
        }
    }

    log::debug!("[extract] scanned {} frames", frames.records());
    Ok(timestamps)
}

/// Sample `metadata.path` through ffmpeg, cropped to `region` (calibrated on
/// 1920x1080 and rescaled to the recording), and scan the frames.
pub fn extract<R: TextRecognizer + ?Sized>(
    metadata: &VideoMetadata,
    recognizer: &mut R,
    triggers: &TriggerSet,
    transcoder: &Transcoder,
    region: Rect,
) -> Result<Vec<u32>> {
    if triggers.is_empty() {
        log::info!("[extract] no trigger events configured, skipping scan");
        return Ok(Vec::new());
    }

    let crop = region
        .scale_to(metadata.width, metadata.height)
        .clamp_to(metadata.width, metadata.height)
        .ok_or_else(|| {
            Error::from(format!(
                "region {} lies outside the {}x{} recording",
                region, metadata.width, metadata.height
            ))
        })?;

    let mut ffmpeg = transcoder.spawn_frame_stream(&metadata.path, SAMPLES_PER_SECOND, crop)?;
    let stdout = ffmpeg
        .take_stdout()
        .ok_or_else(|| Error::from("ffmpeg stdout was not captured"))?;

    match scan_frames(stdout, recognizer, triggers) {
        Ok(timestamps) => {
            ffmpeg.wait(format!("decoding {}", metadata.path.display()))?;
            Ok(timestamps)
        }
        Err(e) => {
            if let Err(kill) = ffmpeg.kill() {
                log::warn!("could not kill ffmpeg: {}", kill);
            }
            Err(e.context(format!("scanning {}", metadata.path.display())))
        }
    }
}
