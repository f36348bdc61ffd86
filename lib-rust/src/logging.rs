use serde::Deserialize;

/// Specify which extra diagnostics are logged.
/// Having all messages enabled with a 1 Hz (or faster) loop is impossible to
/// read, so the noisy channels are off by default and gated behind these
/// flags on top of the usual `RUST_LOG` level filter.
#[derive(Copy, Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// log every ffmpeg/ffprobe command line before it is spawned
    pub debug_ffmpeg: bool,

    /// let ffmpeg write its own progress and warnings to our stderr
    pub log_ffmpeg_stderr: bool,

    /// log the state and duration of every polling tick
    pub debug_ticks: bool,
}

/// Install the global `env_logger`. `RUST_LOG` takes precedence; otherwise
/// `info` (or `debug` when `verbose`).
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    // A second init (e.g. from tests) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
