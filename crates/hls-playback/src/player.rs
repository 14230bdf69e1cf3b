use crate::errors::Result;
use tokio::sync::broadcast;

/// Events the player publishes to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    /// Playback failed; carries the player's diagnostic.
    Error(String),
    /// Reached the end of the stream.
    Ended,
    /// Player was closed or destroyed by the user or host.
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subtitle {
    pub label: String,
    pub url: String,
}

/// Player control surface supplied by the host.
#[async_trait::async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, url: &str, title: &str, subtitles: &[Subtitle]) -> Result<()>;
    /// Current playback offset in seconds.
    async fn current_time(&self) -> Result<f64>;
    async fn seek(&self, seconds: f64) -> Result<()>;
    /// True once enough data is buffered to seek.
    async fn is_ready(&self) -> bool;
    /// Register an observer. Dropping the receiver deregisters it.
    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;
}
