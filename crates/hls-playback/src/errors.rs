use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session create failed: {0}")]
    SessionCreate(String),
    #[error("session start failed: {0}")]
    SessionStart(String),
    #[error("no playable video file found: {0}")]
    NoVideoFileFound(String),
    #[error("all stream sources exhausted")]
    AllSourcesExhausted,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cancelled by user")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PlaybackError {
    /// Text shown to the user in the single error notification of a failed `play`.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::NoVideoFileFound(_) => "No playable video file found".to_string(),
            PlaybackError::AllSourcesExhausted => "All servers are unavailable".to_string(),
            PlaybackError::InvalidInput(msg) => format!("Invalid input: {msg}"),
            other => format!("Loading failed: {other}"),
        }
    }
}

pub type Result<T, E = PlaybackError> = std::result::Result<T, E>;
