use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PlaybackError;

/// Content the user asked to watch, as handed over by the host UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRef {
    /// External catalog id (e.g. an IMDb id). May be absent for local-only cards.
    pub external_id: Option<String>,
    pub title: String,
}

impl ContentRef {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub hash: String,
    pub title: String,
    pub size_bytes: i64,
    pub status_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDescriptor {
    pub id: String,
    pub path: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddResult {
    pub hash: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Quality {
    #[serde(rename = "2160p")]
    Uhd2160,
    #[default]
    #[serde(rename = "1080p")]
    Fhd1080,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "480p")]
    Sd480,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Uhd2160,
        Quality::Fhd1080,
        Quality::Hd720,
        Quality::Sd480,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Uhd2160 => "2160p",
            Quality::Fhd1080 => "1080p",
            Quality::Hd720 => "720p",
            Quality::Sd480 => "480p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2160p" | "4k" => Ok(Quality::Uhd2160),
            "1080p" => Ok(Quality::Fhd1080),
            "720p" => Ok(Quality::Hd720),
            "480p" => Ok(Quality::Sd480),
            other => Err(PlaybackError::InvalidInput(format!(
                "unknown quality '{other}', expected one of 2160p, 1080p, 720p, 480p"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Creating,
    Starting,
    Ready,
    Playing,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSession {
    /// Backend session id; `None` for direct streams that have no server-side lifecycle.
    pub session_id: Option<String>,
    pub source_hash: String,
    pub file_id: String,
    pub quality: Quality,
    pub stream_url: String,
    pub state: SessionState,
    /// Alternate stream origins tried in order on player errors.
    #[serde(default)]
    pub backups: Vec<String>,
    #[serde(default)]
    pub failover_attempts: usize,
}

impl PlaybackSession {
    /// Terminal states are final; moves out of them are ignored.
    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            tracing::warn!(
                hash = %self.source_hash,
                from = ?self.state,
                to = ?next,
                "ignoring transition out of terminal state"
            );
            return;
        }
        tracing::debug!(
            hash = %self.source_hash,
            from = ?self.state,
            to = ?next,
            "session state change"
        );
        self.state = next;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub source_hash: String,
    pub file_id: String,
    pub offset_seconds: f64,
    pub saved_at_epoch_ms: i64,
}

/// Response of the balancer play endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalancerPlay {
    pub stream_url: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub backup_torrservers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_parses_and_displays() {
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::Hd720);
        assert_eq!("4K".parse::<Quality>().unwrap(), Quality::Uhd2160);
        assert_eq!(Quality::Sd480.to_string(), "480p");
        assert!("360p".parse::<Quality>().is_err());
    }

    #[test]
    fn quality_serializes_as_label() {
        let v = serde_json::to_value(Quality::Fhd1080).unwrap();
        assert_eq!(v, serde_json::json!("1080p"));
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Ready.is_terminal());
    }

    #[test]
    fn terminal_state_is_final() {
        let mut s = PlaybackSession {
            session_id: None,
            source_hash: "h".into(),
            file_id: "0".into(),
            quality: Quality::Hd720,
            stream_url: String::new(),
            state: SessionState::Stopping,
            backups: Vec::new(),
            failover_attempts: 0,
        };
        s.transition(SessionState::Stopped);
        s.transition(SessionState::Failed);
        assert_eq!(s.state, SessionState::Stopped);
        s.transition(SessionState::Playing);
        assert_eq!(s.state, SessionState::Stopped);
    }
}
