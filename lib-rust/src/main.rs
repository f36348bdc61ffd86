use clap::{Parser, Subcommand, ValueEnum};
use replay_trigger::{
    capture::{crop_image, FfmpegScreenCapture, Region},
    config::{Config, TriggerNames},
    error::Result,
    events::EventType,
    ffmpeg::Transcoder,
    logging::init_logger,
    monitor::EventMonitor,
    obs::ObsClient,
    pipeline::{process_recording, HighlightPipeline},
    recognizer::{detect_events, TextRecognizer},
    replay::ReplayTriggerLoop,
    session::GameSession,
    ticker::CancelToken,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "replay-trigger", version)]
#[command(about = "Record game highlights by reading the HUD", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    websocket_host: Option<String>,

    #[arg(long, global = true)]
    websocket_port: Option<u16>,

    #[arg(long, global = true)]
    websocket_pass: Option<String>,

    /// Events that count as highlights [default: knock squad-wipe]. A bare
    /// `-t` disables triggering.
    #[arg(short = 't', long, value_enum, num_args = 0.., global = true)]
    replay_triggers: Option<Vec<TriggerArg>>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record each match and cut a highlights video from it (default)
    Session,

    /// Keep the replay buffer running and save it after trigger events
    Replay,

    /// Cut a highlights video from an existing recording
    Process { video: PathBuf },

    /// Print the events found in a screenshot
    Classify {
        image: PathBuf,

        /// Read the whole image instead of the player-event region
        #[arg(long)]
        no_crop: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TriggerArg {
    Assist,
    Knock,
    SquadWipe,
}

impl From<TriggerArg> for EventType {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Assist => EventType::Assist,
            TriggerArg::Knock => EventType::Knock,
            TriggerArg::SquadWipe => EventType::SquadWipe,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(_) => log::info!("[main] done"),
        Err(e) => {
            log::error!("[main] error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);
    let triggers = config.trigger_set();

    match cli.command.unwrap_or(Command::Session) {
        Command::Session => {
            let cancel = CancelToken::new();
            cancel.cancel_on_ctrlc()?;
            let monitor = EventMonitor::new(screen_capture(&config), build_recognizer(&config)?);
            let pipeline = HighlightPipeline::from_config(&config);
            let mut obs = ObsClient::connect(&config.obs)?;
            GameSession::new(monitor, triggers, pipeline, &config.session)
                .debug_ticks(config.logging.debug_ticks)
                .run(&mut obs, &cancel)
        }

        Command::Replay => {
            let cancel = CancelToken::new();
            cancel.cancel_on_ctrlc()?;
            let monitor = EventMonitor::new(screen_capture(&config), build_recognizer(&config)?);
            let mut obs = ObsClient::connect(&config.obs)?;
            ReplayTriggerLoop::new(monitor, triggers, &config.replay)
                .debug_ticks(config.logging.debug_ticks)
                .run(&mut obs, &cancel)
        }

        Command::Process { video } => {
            let mut recognizer = build_recognizer(&config)?;
            let pipeline = HighlightPipeline::from_config(&config);
            match process_recording(&video, &triggers, &mut recognizer, &pipeline)? {
                Some(output) => println!("{}", output.display()),
                None => println!("no highlights in {}", video.display()),
            }
            Ok(())
        }

        Command::Classify { image: path, no_crop } => {
            let mut recognizer = build_recognizer(&config)?;
            let mut frame = image::open(&path)?.to_rgb8();
            if !no_crop {
                let rect = config
                    .regions
                    .rect(Region::PlayerEvent)
                    .scale_to(frame.width(), frame.height());
                frame = crop_image(&frame, rect)?;
            }
            let events = detect_events(&mut recognizer, &frame)?;
            if events.is_empty() {
                println!("no events");
            }
            for event in events {
                println!("{}", event);
            }
            Ok(())
        }
    }
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.websocket_host {
        config.obs.host = host.clone();
    }
    if let Some(port) = cli.websocket_port {
        config.obs.port = port;
    }
    if let Some(password) = &cli.websocket_pass {
        config.obs.password = password.clone();
    }
    if let Some(triggers) = &cli.replay_triggers {
        config.triggers = TriggerNames(
            triggers
                .iter()
                .map(|&t| EventType::from(t).name().to_string())
                .collect(),
        );
    }
}

fn screen_capture(config: &Config) -> FfmpegScreenCapture {
    FfmpegScreenCapture::new(Transcoder::from_config(config), config.regions)
}

#[cfg(feature = "tesseract")]
fn build_recognizer(config: &Config) -> Result<Box<dyn TextRecognizer>> {
    let recognizer = replay_trigger::recognizer::TesseractRecognizer::new(&config.ocr)?;
    Ok(Box::new(recognizer))
}

#[cfg(not(feature = "tesseract"))]
fn build_recognizer(_config: &Config) -> Result<Box<dyn TextRecognizer>> {
    Err("built without OCR support, rebuild with `--features tesseract`".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers_from(args: &[&str]) -> replay_trigger::trigger::TriggerSet {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        config.trigger_set()
    }

    #[test]
    fn bare_trigger_flag_disables_triggering() {
        let cli = Cli::try_parse_from(["replay-trigger", "process", "match.mkv", "-t"]).unwrap();
        assert!(matches!(cli.replay_triggers.as_deref(), Some([])));
        assert!(triggers_from(&["replay-trigger", "process", "match.mkv", "-t"]).is_empty());
    }

    #[test]
    fn trigger_flag_replaces_the_defaults() {
        let triggers = triggers_from(&["replay-trigger", "replay", "-t", "knock"]);
        assert!(triggers.contains(EventType::Knock));
        assert!(!triggers.contains(EventType::SquadWipe));
    }

    #[test]
    fn defaults_apply_without_the_flag() {
        let triggers = triggers_from(&["replay-trigger", "session"]);
        assert!(triggers.contains(EventType::Knock));
        assert!(triggers.contains(EventType::SquadWipe));
        assert!(!triggers.contains(EventType::Assist));
    }

    #[test]
    fn websocket_flags_override_config() {
        let cli = Cli::try_parse_from([
            "replay-trigger",
            "replay",
            "--websocket-port",
            "4460",
            "--websocket-pass",
            "secret",
        ])
        .unwrap();
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.obs.port, 4460);
        assert_eq!(config.obs.password, "secret");
    }
}
