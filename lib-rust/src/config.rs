use crate::{
    capture::{Rect, Region},
    error::{Error, Result},
    logging::LoggingConfig,
    threshold::ThresholdFilter,
    trigger::TriggerSet,
};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// Everything tunable about a run. Every field has a default, so an empty (or
/// missing) config file is valid; CLI flags are applied on top.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub obs: ObsConfig,
    pub regions: RegionConfig,
    pub replay: ReplayConfig,
    pub session: SessionConfig,
    pub ffmpeg: FfmpegConfig,
    pub ocr: OcrConfig,
    pub logging: LoggingConfig,
    pub triggers: TriggerNames,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::from(e).context(format!("reading {}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn trigger_set(&self) -> TriggerSet {
        TriggerSet::from_names(&self.triggers.0)
    }
}

/// Connection to the OBS websocket server.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout_secs: u64,
}

impl ObsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4455,
            password: "123456".into(),
            timeout_secs: 3,
        }
    }
}

/// HUD text rectangles, in pixels of a 1920x1080 frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub player_event: Rect,
    pub game_start: Rect,
    pub game_end: Rect,
    pub victory: Rect,
}

impl RegionConfig {
    pub fn rect(&self, region: Region) -> Rect {
        match region {
            Region::PlayerEvent => self.player_event,
            Region::GameStart => self.game_start,
            Region::GameEnd => self.game_end,
            Region::Victory => self.victory,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            player_event: Rect::from_bbox(600, 760, 1320, 795),
            game_start: Rect::from_bbox(660, 80, 1260, 170),
            game_end: Rect::from_bbox(40, 30, 760, 110),
            victory: Rect::from_bbox(560, 380, 1360, 560),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub period_ms: u64,
    /// Quiet time after the last trigger before the buffer is saved.
    pub debounce_secs: u64,
}

impl ReplayConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            period_ms: 750,
            debounce_secs: 15,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub period_ms: u64,
}

impl SessionConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

/// Paths to the transcoder binaries. `ffmpeg = None` defers to
/// `ffmpeg-sidecar`'s lookup (next to the executable, then `PATH`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            ffprobe: "ffprobe".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory holding `<language>.traineddata`; defaults to the
    /// executable's directory.
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    pub threshold: Option<ThresholdFilter>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            language: "eng".into(),
            threshold: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TriggerNames(pub Vec<String>);

impl Default for TriggerNames {
    fn default() -> Self {
        Self(vec!["knock".into(), "squad-wipe".into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[test]
    fn empty_file_gives_defaults() -> Result<()> {
        let config = Config::from_toml("")?;
        assert_eq!(config.obs.port, 4455);
        assert_eq!(config.replay.period(), Duration::from_millis(750));
        assert_eq!(config.replay.debounce(), Duration::from_secs(15));
        assert_eq!(config.session.period(), Duration::from_secs(1));
        assert_eq!(
            config.regions.rect(Region::PlayerEvent),
            Rect::from_bbox(600, 760, 1320, 795)
        );
        let triggers = config.trigger_set();
        assert!(triggers.contains(EventType::Knock));
        assert!(triggers.contains(EventType::SquadWipe));
        Ok(())
    }

    #[test]
    fn partial_sections_keep_other_defaults() -> Result<()> {
        let config = Config::from_toml(
            r#"
            triggers = ["assist", "victory"]

            [obs]
            port = 4444

            [regions.victory]
            x = 10
            y = 20
            width = 300
            height = 40

            [ocr.threshold]
            r = 255
            g = 255
            b = 255
            threshold = 42.0
            "#,
        )?;
        assert_eq!(config.obs.port, 4444);
        assert_eq!(config.obs.host, "localhost");
        assert_eq!(config.regions.victory, Rect::new(10, 20, 300, 40));
        assert_eq!(config.regions.player_event, RegionConfig::default().player_event);
        assert!(config.ocr.threshold.is_some());
        let triggers = config.trigger_set();
        assert!(triggers.contains(EventType::Assist));
        assert!(!triggers.contains(EventType::Knock));
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::from_toml("[obs]\nport = \"not a number\"").is_err());
    }
}
