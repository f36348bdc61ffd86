use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::io;
use std::num::{ParseFloatError, ParseIntError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub message: String,
    pub source: Option<Box<dyn StdError + 'static>>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref()
    }
}

impl Error {
    /// Wrap any standard Error into a library Error.
    /// Similar to [`anyhow`](https://github.com/dtolnay/anyhow/blob/master/src/error.rs#L88).
    pub fn from_std<E>(e: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Error {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }

    /// Wrap any Display into a library Error.
    pub fn from_display<E>(e: E) -> Self
    where
        E: Display,
    {
        Error {
            message: e.to_string(),
            source: None,
        }
    }

    /// Prefix the message with what was being attempted, keeping the source.
    pub fn context(self, context: impl Display) -> Self {
        Error {
            message: format!("{}: {}", context, self.message),
            source: self.source,
        }
    }
}

/// Represents an attempt to unwrap a None value from an Option.
///
/// ```rs
/// let value = Some(x).ok_or(NoneError)?;
/// ```
#[derive(Debug)]
pub struct NoneError;
impl Display for NoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "called unwrap() on None")
    }
}
impl std::error::Error for NoneError {}

impl From<NoneError> for Error {
    fn from(e: NoneError) -> Self {
        Error::from_std(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::from_std(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::from_std(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::from_std(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::from_std(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::from_std(e)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(e: chrono::ParseError) -> Self {
        Error::from_std(e)
    }
}

impl From<ParseIntError> for Error {
    fn from(e: ParseIntError) -> Self {
        Error::from_std(e)
    }
}

impl From<ParseFloatError> for Error {
    fn from(e: ParseFloatError) -> Self {
        Error::from_std(e)
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::from_display(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::from_display(e)
    }
}

#[cfg(feature = "tesseract")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::from_std(e)
    }
}

#[cfg(feature = "tesseract")]
impl From<tesseract::InitializeError> for Error {
    fn from(e: tesseract::InitializeError) -> Self {
        Error::from_std(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_source() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing.mkv");
        let error = Error::from(io_error).context("probe failed");
        assert_eq!(error.to_string(), "probe failed: missing.mkv");
        assert!(StdError::source(&error).is_some());
    }

    #[test]
    fn display_errors_have_no_source() {
        let error = Error::from("no frames");
        assert_eq!(error.to_string(), "no frames");
        assert!(StdError::source(&error).is_none());
    }
}
