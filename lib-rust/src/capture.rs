//! Screen capture of the fixed HUD regions the game prints its text into.

use crate::{
    config::RegionConfig,
    error::{Error, Result},
    ffmpeg::Transcoder,
};
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use std::{
    fmt::{Display, Formatter},
    io::Read,
};

/// Width of the display the default regions were calibrated on.
pub const REFERENCE_WIDTH: u32 = 1920;
/// Height of the display the default regions were calibrated on.
pub const REFERENCE_HEIGHT: u32 = 1080;

/// Defines a rectangle within a image/video frame
/// - Units are pixels
/// - Origin is top-left (0, 0)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// From `(left, top, right, bottom)` corners.
    pub const fn from_bbox(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    /// Rescale a rectangle calibrated on 1920x1080 to a frame of another size.
    pub fn scale_to(&self, frame_width: u32, frame_height: u32) -> Rect {
        let sx = frame_width as f64 / REFERENCE_WIDTH as f64;
        let sy = frame_height as f64 / REFERENCE_HEIGHT as f64;
        Rect {
            x: (self.x as f64 * sx).round() as u32,
            y: (self.y as f64 * sy).round() as u32,
            width: ((self.width as f64 * sx).round() as u32).max(1),
            height: ((self.height as f64 * sy).round() as u32).max(1),
        }
    }

    /// Shrink to fit inside a `width` x `height` frame; `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Rect::new(self.x, self.y, w, h))
    }

    /// ffmpeg `crop` filter arguments (`w:h:x:y`).
    pub fn crop_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// The named HUD areas that get captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    /// Knock/assist/squad wipe notifications
    PlayerEvent,
    /// "YOUR SQUAD" banner when the drop ship loads
    GameStart,
    /// "SQUAD SUMMARY" screen header
    GameEnd,
    /// "CHAMPION" banner
    Victory,
}

impl Region {
    pub fn name(&self) -> &'static str {
        match self {
            Region::PlayerEvent => "player_event",
            Region::GameStart => "game_start",
            Region::GameEnd => "game_end",
            Region::Victory => "victory",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of pixels for a named region.
pub trait ScreenCapture {
    fn grab(&mut self, region: Region) -> Result<RgbImage>;
}

/// Copy a sub-rectangle out of an image, clamped to the image bounds.
pub fn crop_image(image: &RgbImage, rect: Rect) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let rect = rect.clamp_to(width, height).ok_or_else(|| {
        Error::from(format!(
            "region {} lies outside the {}x{} image",
            rect, width, height
        ))
    })?;
    Ok(image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Grabs a single frame of one screen region per call by running ffmpeg's
/// desktop capture device (`gdigrab`, `x11grab` or `avfoundation`) and
/// decoding the PNG it writes to stdout.
pub struct FfmpegScreenCapture {
    transcoder: Transcoder,
    regions: RegionConfig,
    /// X11 display (`$DISPLAY`) or avfoundation screen index.
    device: String,
}

impl FfmpegScreenCapture {
    pub fn new(transcoder: Transcoder, regions: RegionConfig) -> Self {
        let device = if cfg!(target_os = "macos") {
            "1".to_string()
        } else {
            std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string())
        };
        Self {
            transcoder,
            regions,
            device,
        }
    }

    fn input_args(&self, rect: Rect) -> Vec<String> {
        let size = format!("{}x{}", rect.width, rect.height);
        if cfg!(target_os = "windows") {
            vec![
                "-f".into(),
                "gdigrab".into(),
                "-offset_x".into(),
                rect.x.to_string(),
                "-offset_y".into(),
                rect.y.to_string(),
                "-video_size".into(),
                size,
                "-i".into(),
                "desktop".into(),
            ]
        } else if cfg!(target_os = "macos") {
            // avfoundation can't offset, so crop after capture
            vec![
                "-f".into(),
                "avfoundation".into(),
                "-i".into(),
                format!("{}:none", self.device),
                "-vf".into(),
                rect.crop_filter(),
            ]
        } else {
            vec![
                "-f".into(),
                "x11grab".into(),
                "-video_size".into(),
                size,
                "-i".into(),
                format!("{}+{},{}", self.device, rect.x, rect.y),
            ]
        }
    }
}

impl ScreenCapture for FfmpegScreenCapture {
    fn grab(&mut self, region: Region) -> Result<RgbImage> {
        let rect = self.regions.rect(region);
        let mut cmd = self.transcoder.ffmpeg();
        cmd.args(self.input_args(rect)).args([
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "-",
        ]);
        let mut ffmpeg = self.transcoder.spawn(&mut cmd)?;
        let mut png = Vec::new();
        if let Some(mut stdout) = ffmpeg.take_stdout() {
            stdout.read_to_end(&mut png)?;
        }
        ffmpeg.wait(format!("grabbing {}", region))?;
        if png.is_empty() {
            return Err(format!("screen grab of {} produced no image", region).into());
        }

        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        Ok(image.to_rgb8())
    }
}
