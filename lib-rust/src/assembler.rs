//! Turn event timestamps into highlight windows and splice them into one
//! video.

use crate::{
    error::{Error, Result},
    ffmpeg::{Transcoder, VideoMetadata},
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// A span of the source recording, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HighlightWindow {
    pub start: f64,
    pub end: f64,
}

impl HighlightWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterParams {
    /// Seconds kept before the first event of a window
    pub lookback: u32,
    /// Seconds kept after the last event of a window
    pub lookahead: u32,
    /// Events closer together than this share a window
    pub merge_gap: u32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            lookahead: 5,
            merge_gap: 20,
        }
    }
}

/// [`cluster_with`] using the default parameters.
pub fn cluster(timestamps: &[u32]) -> Vec<HighlightWindow> {
    cluster_with(timestamps, ClusterParams::default())
}

/// Group event timestamps into ascending, non-overlapping windows.
pub fn cluster_with(timestamps: &[u32], params: ClusterParams) -> Vec<HighlightWindow> {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let open = |t: u32| HighlightWindow {
        start: t.saturating_sub(params.lookback) as f64,
        end: (t + params.lookahead) as f64,
    };

    let mut windows = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return windows;
    };
    let mut current = open(first);
    let mut previous = first;
    for t in iter {
        if t - previous < params.merge_gap {
            current.end = (t + params.lookahead) as f64;
        } else {
            let mut next = open(t);
            // a lookback reaching into the previous window starts where it ends
            next.start = next.start.max(current.end);
            windows.push(current);
            current = next;
        }
        previous = t;
    }
    windows.push(current);
    windows
}

/// Cut every window out of the recording and concatenate them into
/// `Highlights_<stem>.mkv` next to it. No windows, no output.
///
/// Intermediate files are removed whether or not assembly succeeds.
pub fn assemble(
    metadata: &VideoMetadata,
    windows: &[HighlightWindow],
    transcoder: &Transcoder,
) -> Result<Option<PathBuf>> {
    if windows.is_empty() {
        log::info!("[assemble] no highlight windows, nothing to do");
        return Ok(None);
    }

    let dir = output_dir(&metadata.path)?;
    let stem = metadata.stem();
    let manifest = dir.join(format!("{}_concat.txt", stem));
    let output = dir.join(format!("Highlights_{}.mkv", stem));

    let mut segments = Vec::with_capacity(windows.len());
    let result = cut_and_concat(
        metadata,
        windows,
        transcoder,
        &dir,
        &stem,
        &manifest,
        &output,
        &mut segments,
    );

    for path in segments.iter().chain(std::iter::once(&manifest)) {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("could not remove {}: {}", path.display(), e);
            }
        }
    }

    result?;
    log::info!(
        "[assemble] wrote {} windows to {}",
        windows.len(),
        output.display()
    );
    Ok(Some(output))
}

#[allow(clippy::too_many_arguments)]
fn cut_and_concat(
    metadata: &VideoMetadata,
    windows: &[HighlightWindow],
    transcoder: &Transcoder,
    dir: &Path,
    stem: &str,
    manifest: &Path,
    output: &Path,
    segments: &mut Vec<PathBuf>,
) -> Result<()> {
    for (i, window) in windows.iter().enumerate() {
        let segment = dir.join(format!("{}_segment_{}.mp4", stem, i));
        segments.push(segment.clone());
        log::debug!(
            "[assemble] segment {}: {:.1}s - {:.1}s",
            i,
            window.start,
            window.end
        );
        transcoder
            .cut_segment(&metadata.path, window.start, window.duration(), &segment)
            .map_err(|e| e.context(format!("cutting segment {}", i)))?;
    }

    write_manifest(manifest, segments)?;
    transcoder
        .concat(manifest, output)
        .map_err(|e| e.context("concatenating segments"))
}

/// The recording's directory, absolute so the manifest entries are too.
fn output_dir(recording: &Path) -> Result<PathBuf> {
    let dir = recording
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::canonicalize(dir)
        .map_err(|e| Error::from(e).context(format!("resolving {}", dir.display())))
}

/// Write an ffmpeg concat-demuxer manifest listing `segments` in order.
pub fn write_manifest(path: &Path, segments: &[PathBuf]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    for segment in segments {
        writeln!(file, "{}", manifest_line(segment))?;
    }
    Ok(())
}

fn manifest_line(segment: &Path) -> String {
    let escaped = segment.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(pairs: &[(f64, f64)]) -> Vec<HighlightWindow> {
        pairs
            .iter()
            .map(|&(start, end)| HighlightWindow { start, end })
            .collect()
    }

    #[test]
    fn cluster_empty() {
        assert_eq!(cluster(&[]), vec![]);
    }

    #[test]
    fn cluster_single_event() {
        assert_eq!(cluster(&[50]), windows(&[(30.0, 55.0)]));
    }

    #[test]
    fn cluster_far_apart_events_stay_separate() {
        assert_eq!(
            cluster(&[10, 100]),
            windows(&[(0.0, 15.0), (80.0, 105.0)])
        );
    }

    #[test]
    fn cluster_close_events_merge() {
        assert_eq!(cluster(&[10, 25]), windows(&[(0.0, 30.0)]));
    }

    #[test]
    fn cluster_mixed() {
        assert_eq!(
            cluster(&[10, 25, 60, 65, 70]),
            windows(&[(0.0, 30.0), (40.0, 75.0)])
        );
    }

    #[test]
    fn cluster_start_clamps_to_zero() {
        assert_eq!(cluster(&[5, 10]), windows(&[(0.0, 15.0)]));
    }

    #[test]
    fn cluster_gap_of_exactly_merge_gap_splits_without_overlap() {
        assert_eq!(cluster(&[30, 50]), windows(&[(10.0, 35.0), (35.0, 55.0)]));
    }

    #[test]
    fn cluster_sorts_and_keeps_duplicates_harmless() {
        let sorted = cluster(&[10, 10, 25, 25, 90]);
        assert_eq!(cluster(&[90, 25, 10, 25, 10]), sorted);
        assert_eq!(sorted, windows(&[(0.0, 30.0), (70.0, 95.0)]));
    }

    #[test]
    fn windows_are_ascending_and_non_empty() {
        let timestamps = [0, 3, 19, 40, 41, 200, 219, 500];
        let result = cluster(&timestamps);
        for w in &result {
            assert!(w.start >= 0.0);
            assert!(w.end > w.start);
        }
        for pair in result.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn custom_params() {
        let params = ClusterParams {
            lookback: 2,
            lookahead: 1,
            merge_gap: 5,
        };
        assert_eq!(
            cluster_with(&[10, 14, 30], params),
            windows(&[(8.0, 15.0), (28.0, 31.0)])
        );
    }

    #[test]
    fn manifest_quotes_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manifest = dir.path().join("list.txt");
        let segments = vec![
            PathBuf::from("/videos/a_segment_0.mp4"),
            PathBuf::from("/videos/it's_segment_1.mp4"),
        ];
        write_manifest(&manifest, &segments)?;
        assert_eq!(
            fs::read_to_string(&manifest)?,
            "file '/videos/a_segment_0.mp4'\nfile '/videos/it'\\''s_segment_1.mp4'\n"
        );
        Ok(())
    }

    #[test]
    fn assemble_without_windows_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let recording = dir.path().join("2024-05-06 21-14-11.mkv");
        let time = chrono::NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(21, 14, 11)
            .unwrap();
        let metadata = VideoMetadata {
            path: recording,
            duration: 60.0,
            framerate: 60.0,
            width: 1920,
            height: 1080,
            start_time: time,
            end_time: time,
        };
        assert_eq!(assemble(&metadata, &[], &Transcoder::default())?, None);
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
