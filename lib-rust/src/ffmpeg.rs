use crate::{
    capture::Rect,
    config::Config,
    error::{Error, Result},
    logging::LoggingConfig,
    util::command_to_string,
};
use chrono::{DateTime, Local, NaiveDateTime};
use ffmpeg_sidecar::{child::FfmpegChild, command::FfmpegCommand};
use regex::Regex;
use serde::Deserialize;
use std::{
    ffi::OsStr,
    fmt::Display,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{ChildStderr, ChildStdout, Command},
    thread::{self, JoinHandle},
};

/// Launches `ffmpeg` and `ffprobe` with consistent stdio handling and
/// optional command logging.
#[derive(Clone, Debug)]
pub struct Transcoder {
    /// `None` uses ffmpeg-sidecar's default lookup
    pub ffmpeg_exe: Option<PathBuf>,
    pub ffprobe_exe: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            ffmpeg_exe: None,
            ffprobe_exe: "ffprobe".into(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Transcoder {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_exe: config.ffmpeg.ffmpeg.clone(),
            ffprobe_exe: config.ffmpeg.ffprobe.clone(),
            logging: config.logging,
        }
    }

    /// A fresh ffmpeg command. All three stdio channels stay piped (ffmpeg-sidecar
    /// requires it); [`Transcoder::spawn`] closes stdin and drains stderr.
    pub fn ffmpeg(&self) -> FfmpegCommand {
        match &self.ffmpeg_exe {
            Some(exe) => FfmpegCommand::new_with_path(exe),
            None => FfmpegCommand::new(),
        }
    }

    /// Spawn an ffmpeg command built by [`Transcoder::ffmpeg`].
    pub fn spawn(&self, cmd: &mut FfmpegCommand) -> Result<FfmpegProcess> {
        self.log_command(cmd.as_inner());
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::from(e).context("could not run ffmpeg"))?;
        drop(child.take_stdin());
        let stderr = match child.take_stderr() {
            Some(stderr) => Some(spawn_stderr_thread(stderr, self.logging)?),
            None => None,
        };
        Ok(FfmpegProcess { child, stderr })
    }

    pub fn log_command(&self, cmd: &Command) {
        if self.logging.debug_ffmpeg {
            log::info!("[ffmpeg] command:\n{}", command_to_string(cmd));
        }
    }

    /// Probe a recording for duration, framerate and dimensions.
    pub fn probe(&self, path: &Path) -> Result<VideoMetadata> {
        let mut cmd = Command::new(&self.ffprobe_exe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v",
            "-show_entries",
            "format=duration",
            "-show_entries",
            "stream=r_frame_rate,width,height",
            "-of",
            "json",
        ])
        .arg(path);
        self.log_command(&cmd);

        let output = cmd
            .output()
            .map_err(|e| Error::from(e).context("could not run ffprobe"))?;
        if !output.status.success() {
            return Err(format!(
                "ffprobe failed on {} ({}): {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }

        let end_time = recording_end_time(path)?;
        VideoMetadata::from_probe_json(path, &output.stdout, end_time)
    }

    /// Spawn ffmpeg decoding `input` at `fps` frames per second, cropped to
    /// `crop`, as a stream of PNG images on stdout.
    ///
    /// ```text
    /// ffmpeg -i <input> -vf fps=1,crop=w:h:x:y -an -f image2pipe -vcodec png -
    /// ```
    pub fn spawn_frame_stream(&self, input: &Path, fps: u32, crop: Rect) -> Result<FfmpegProcess> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!("fps={},{}", fps, crop.crop_filter()))
            .args(["-an", "-f", "image2pipe", "-vcodec", "png", "-"]);
        self.spawn(&mut cmd)
    }

    /// Copy `[start, start + duration)` of `input` into `output` without
    /// re-encoding.
    pub fn cut_segment(&self, input: &Path, start: f64, duration: f64, output: &Path) -> Result<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-y")
            .arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(input)
            .arg("-t")
            .arg(format!("{:.3}", duration))
            .args(["-c", "copy", "-v", "error"])
            .arg(output);
        self.run(cmd, output)
    }

    /// Join the files listed in a concat-demuxer manifest without re-encoding.
    pub fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-c", "copy", "-v", "error"])
            .arg(output);
        self.run(cmd, output)
    }

    fn run(&self, mut cmd: FfmpegCommand, output: &Path) -> Result<()> {
        self.spawn(&mut cmd)?
            .wait(format!("writing {}", output.display()))
    }
}

/// A running ffmpeg whose stderr is read on a background thread, so it can
/// never stall on a full pipe.
pub struct FfmpegProcess {
    child: FfmpegChild,
    /// Yields the last non-empty stderr line once ffmpeg closes stderr
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.take_stdout()
    }

    /// Kill ffmpeg and reap it. The stderr thread is left to finish on its own.
    pub fn kill(mut self) -> Result<()> {
        self.stderr = None;
        let killed = self.child.kill();
        self.child.wait()?;
        killed.map_err(Error::from)
    }

    /// Wait for ffmpeg to exit. A non-zero exit is an error naming `what`
    /// ffmpeg was doing and the last line it logged.
    pub fn wait(mut self, what: impl Display) -> Result<()> {
        let status = self.child.wait()?;
        if status.success() {
            return Ok(());
        }
        let last_line = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if last_line.is_empty() {
            Err(format!("ffmpeg failed {} ({})", what, status).into())
        } else {
            Err(format!("ffmpeg failed {} ({}): {}", what, status, last_line).into())
        }
    }
}

/// Read ffmpeg's stderr to the end, logging it when `log_ffmpeg_stderr` is
/// set. Ends when ffmpeg exits.
fn spawn_stderr_thread(stderr: ChildStderr, logging: LoggingConfig) -> Result<JoinHandle<String>> {
    let handle = thread::Builder::new()
        .name("ffmpeg_stderr".into())
        .spawn(move || {
            let mut last_line = String::new();
            // split on '\n' rather than lines(): ffmpeg output isn't always utf-8
            for line in BufReader::new(stderr).split(b'\n') {
                let Ok(line) = line else { break };
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if logging.log_ffmpeg_stderr {
                    log::info!("[ffmpeg] {}", line);
                }
                last_line = line.to_string();
            }
            last_line
        })?;
    Ok(handle)
}

/// Facts about one finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub path: PathBuf,
    /// seconds
    pub duration: f64,
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    r_frame_rate: String,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<NumberOrString>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl VideoMetadata {
    /// Build metadata from ffprobe's JSON output. `end_time` is the wall
    /// clock time the recording finished; the start is derived from it.
    pub fn from_probe_json(path: &Path, json: &[u8], end_time: NaiveDateTime) -> Result<Self> {
        let probe: ProbeOutput = serde_json::from_slice(json)?;
        let stream = probe
            .streams
            .first()
            .ok_or_else(|| Error::from(format!("no video stream in {}", path.display())))?;
        let duration = match probe.format.and_then(|f| f.duration) {
            Some(NumberOrString::Number(n)) => n,
            Some(NumberOrString::String(s)) => s.trim().parse::<f64>()?,
            None => return Err(format!("no duration for {}", path.display()).into()),
        };
        let start_time = end_time - chrono::Duration::milliseconds((duration * 1000.0) as i64);

        Ok(Self {
            path: path.to_path_buf(),
            duration,
            framerate: parse_frame_rate(&stream.r_frame_rate)?,
            width: stream.width,
            height: stream.height,
            start_time,
            end_time,
        })
    }

    /// File name without extension, used to name derived files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_else(|| OsStr::new("recording"))
            .to_string_lossy()
            .into_owned()
    }
}

/// Parse ffprobe's `r_frame_rate` (`"60/1"`, `"30000/1001"`, or a bare number).
pub fn parse_frame_rate(text: &str) -> Result<f64> {
    let rate = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse()?;
            let den: f64 = den.trim().parse()?;
            if den == 0.0 {
                return Err(format!("invalid frame rate {:?}", text).into());
            }
            num / den
        }
        None => text.trim().parse()?,
    };
    Ok(rate)
}

/// Find an OBS-style `YYYY-MM-DD HH-MM-SS` (or `_` separated) timestamp in
/// a file name.
pub fn parse_recording_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    lazy_static! {
        static ref REGEX_TIMESTAMP: Regex =
            Regex::new(r"(\d{4}-\d{2}-\d{2})[ _](\d{2}-\d{2}-\d{2})").unwrap();
    }

    let capture = REGEX_TIMESTAMP.captures(file_name)?;
    let text = format!("{} {}", capture.get(1)?.as_str(), capture.get(2)?.as_str());
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H-%M-%S").ok()
}

/// When the recording finished: the timestamp in its name, or the file's
/// modification time when the name carries none.
pub fn recording_end_time(path: &Path) -> Result<NaiveDateTime> {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    if let Some(timestamp) = stem.as_deref().and_then(parse_recording_timestamp) {
        return Ok(timestamp);
    }
    log::warn!(
        "no timestamp in {}, using its modification time",
        path.display()
    );
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}
