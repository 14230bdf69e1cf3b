use crate::errors::{PlaybackError, Result};
use crate::model::{AddResult, BalancerPlay, FileDescriptor, Quality, Source};

#[async_trait::async_trait]
pub trait TorrentBackend: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>>;
    async fn add_source(&self, link: &str, title: &str) -> Result<AddResult>;
    async fn list_files(&self, hash: &str) -> Result<Vec<FileDescriptor>>;
    /// Allocate a backend session for one file; returns its id.
    async fn create_session(&self, hash: &str, file_id: &str) -> Result<String>;
    async fn start_session(&self, session_id: &str, quality: Quality) -> Result<()>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
    async fn request_play(
        &self,
        imdb_id: &str,
        user_id: &str,
        quality: Quality,
    ) -> Result<BalancerPlay>;
    /// Base URL the stream URL templates are built on.
    fn stream_base(&self) -> &str;
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Backend used when nothing is configured; every network call fails.
pub struct NullBackend;

#[async_trait::async_trait]
impl TorrentBackend for NullBackend {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(vec![])
    }

    async fn add_source(&self, _link: &str, _title: &str) -> Result<AddResult> {
        Err(unavailable())
    }

    async fn list_files(&self, _hash: &str) -> Result<Vec<FileDescriptor>> {
        Ok(vec![])
    }

    async fn create_session(&self, _hash: &str, _file_id: &str) -> Result<String> {
        Err(unavailable())
    }

    async fn start_session(&self, _session_id: &str, _quality: Quality) -> Result<()> {
        Err(unavailable())
    }

    async fn delete_session(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn request_play(
        &self,
        _imdb_id: &str,
        _user_id: &str,
        _quality: Quality,
    ) -> Result<BalancerPlay> {
        Err(unavailable())
    }

    fn stream_base(&self) -> &str {
        ""
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

fn unavailable() -> PlaybackError {
    PlaybackError::Transport("no streaming backend configured".into())
}

pub mod http;
pub mod shapes;
