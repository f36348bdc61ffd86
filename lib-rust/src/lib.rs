#[macro_use]
extern crate lazy_static;

pub mod assembler;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod extractor;
pub mod ffmpeg;
pub mod logging;
pub mod monitor;
pub mod obs;
pub mod pipeline;
pub mod png;
pub mod recognizer;
pub mod replay;
pub mod session;
pub mod threshold;
pub mod ticker;
pub mod trigger;
pub mod util;
