use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The detector never became usable. Fatal to every detection feature.
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    /// A single detection pass failed. Recoverable.
    #[error("Detection call failed: {0}")]
    DetectionCallFailed(String),

    /// Media has no decoded pixels yet. Callers treat this as a no-op.
    #[error("Media not ready: {0}")]
    MediaNotReady(String),

    #[error("Media load error: {0}")]
    MediaLoad(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the pipeline can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::DetectorUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
