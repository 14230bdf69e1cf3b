//! Lifecycle of the single current playback session.
//!
//! `Idle -> Creating -> Starting -> Ready -> Playing -> Stopping -> Stopped`,
//! with `Failed` reachable from any non-terminal state. Creating and starting
//! are separate backend calls so allocation failures (`SessionCreate`) can be
//! told apart from transcode-start failures (`SessionStart`).

use std::sync::Arc;

use url::Url;

use crate::errors::{PlaybackError, Result};
use crate::model::{PlaybackSession, Quality, SessionState};
use crate::player::Player;
use crate::rpc::TorrentBackend;

pub fn session_stream_url(base: &str, session_id: &str) -> String {
    format!("{}/orchestrator/{session_id}/master.m3u8", base.trim_end_matches('/'))
}

pub fn direct_stream_url(base: &str, hash: &str, file_id: &str) -> String {
    format!("{}/hls/{hash}/{file_id}/master.m3u8", base.trim_end_matches('/'))
}

/// Move the path and query of `stream_url` onto another origin.
pub fn rewrite_origin(stream_url: &str, origin: &str) -> Result<String> {
    let current = Url::parse(stream_url)
        .map_err(|e| PlaybackError::InvalidInput(format!("stream url '{stream_url}': {e}")))?;
    Url::parse(origin)
        .map_err(|e| PlaybackError::InvalidInput(format!("backup origin '{origin}': {e}")))?;
    let mut out = format!("{}{}", origin.trim_end_matches('/'), current.path());
    if let Some(q) = current.query() {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Stream URL for the same content on a backup server.
///
/// Session ids are allocated per server, so the backup is always addressed
/// through the direct `/hls/` template. Falls back to moving the current path
/// onto the backup origin when the content hash is unknown.
pub fn backup_stream_url(origin: &str, session: &PlaybackSession) -> Result<String> {
    Url::parse(origin)
        .map_err(|e| PlaybackError::InvalidInput(format!("backup origin '{origin}': {e}")))?;
    let hash = session.source_hash.as_str();
    if hash.is_empty() {
        return rewrite_origin(&session.stream_url, origin);
    }
    if session.file_id.is_empty() {
        return Ok(format!("{}/hls/{hash}/master.m3u8", origin.trim_end_matches('/')));
    }
    Ok(direct_stream_url(origin, hash, &session.file_id))
}

/// Content hash of a `/hls/{hash}/...` stream URL.
pub fn hash_from_stream_url(stream_url: &str) -> Option<String> {
    let url = Url::parse(stream_url).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "hls")?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub struct SessionManager {
    backend: Arc<dyn TorrentBackend>,
    current: Option<PlaybackSession>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn TorrentBackend>) -> Self {
        Self {
            backend,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&PlaybackSession> {
        self.current.as_ref()
    }

    /// Create a backend session for `(hash, file_id)`, start it at `quality`
    /// and make it current. Any previous current session is torn down.
    pub async fn create_and_start(
        &mut self,
        hash: &str,
        file_id: &str,
        quality: Quality,
    ) -> Result<PlaybackSession> {
        let mut session = blank_session(hash, file_id, quality);
        session.transition(SessionState::Creating);
        let session_id = match self.backend.create_session(hash, file_id).await {
            Ok(id) => id,
            Err(e) => {
                session.transition(SessionState::Failed);
                tracing::error!(%hash, %file_id, error = %e, "session create failed");
                return Err(e);
            }
        };
        session.session_id = Some(session_id.clone());

        session.transition(SessionState::Starting);
        if let Err(e) = self.backend.start_session(&session_id, quality).await {
            session.transition(SessionState::Failed);
            tracing::error!(%session_id, error = %e, "session start failed");
            if let Err(del) = self.backend.delete_session(&session_id).await {
                tracing::warn!(%session_id, error = %del, "cleanup of unstarted session failed");
            }
            return Err(match e {
                PlaybackError::SessionStart(_) => e,
                other => PlaybackError::SessionStart(other.to_string()),
            });
        }

        session.stream_url = session_stream_url(self.backend.stream_base(), &session_id);
        session.transition(SessionState::Ready);
        tracing::info!(%session_id, %hash, %file_id, %quality, "session ready");
        self.replace_current(session.clone()).await;
        Ok(session)
    }

    /// Make a direct `/hls/{hash}/{file}` stream current; no backend session exists.
    pub async fn open_direct(
        &mut self,
        hash: &str,
        file_id: &str,
        quality: Quality,
    ) -> PlaybackSession {
        let mut session = blank_session(hash, file_id, quality);
        session.stream_url = direct_stream_url(self.backend.stream_base(), hash, file_id);
        session.transition(SessionState::Ready);
        self.replace_current(session.clone()).await;
        session
    }

    /// Adopt a stream URL handed out by the balancer, with its backup origins.
    pub async fn adopt_stream(
        &mut self,
        stream_url: &str,
        quality: Quality,
        backups: Vec<String>,
    ) -> PlaybackSession {
        let hash = hash_from_stream_url(stream_url).unwrap_or_default();
        let mut session = blank_session(&hash, "", quality);
        session.stream_url = stream_url.to_string();
        session.backups = backups;
        session.transition(SessionState::Ready);
        self.replace_current(session.clone()).await;
        session
    }

    pub fn attach_backups(&mut self, backups: Vec<String>) {
        if let Some(s) = self.current.as_mut() {
            s.backups = backups;
            s.failover_attempts = 0;
        }
    }

    pub fn mark_playing(&mut self) {
        if let Some(s) = self.current.as_mut() {
            if s.state == SessionState::Ready {
                s.transition(SessionState::Playing);
            }
        }
    }

    /// Delete the backend session. Never fails: the player is already gone.
    pub async fn teardown(&self, session: &mut PlaybackSession) {
        self.release(session, SessionState::Stopped).await;
    }

    /// Delete the backend session and settle in `end`, which must be terminal.
    async fn release(&self, session: &mut PlaybackSession, end: SessionState) {
        if session.state.is_terminal() {
            return;
        }
        session.transition(SessionState::Stopping);
        if let Some(id) = session.session_id.as_deref() {
            match self.backend.delete_session(id).await {
                Ok(()) => tracing::info!(session_id = %id, "session deleted"),
                Err(e) => tracing::warn!(session_id = %id, error = %e, "session delete failed"),
            }
        }
        session.transition(end);
    }

    pub async fn teardown_current(&mut self) -> Option<PlaybackSession> {
        let mut session = self.current.take()?;
        self.teardown(&mut session).await;
        Some(session)
    }

    /// Switch the player to the next unused backup origin after a playback error.
    ///
    /// Returns the new stream URL, or `AllSourcesExhausted` once every backup
    /// has been tried. The exhausted session is released and stays current in
    /// the `Failed` state until the next session replaces it.
    pub async fn failover(&mut self, player: &dyn Player, title: &str) -> Result<String> {
        let Some(session) = self.current.as_mut() else {
            return Err(PlaybackError::AllSourcesExhausted);
        };
        if session.failover_attempts >= session.backups.len() {
            tracing::error!(
                attempts = session.failover_attempts,
                "all backup servers failed"
            );
            if let Some(mut s) = self.current.take() {
                self.release(&mut s, SessionState::Failed).await;
                self.current = Some(s);
            }
            return Err(PlaybackError::AllSourcesExhausted);
        }
        let origin = session.backups[session.failover_attempts].clone();
        session.failover_attempts += 1;
        let next = backup_stream_url(&origin, session)?;
        tracing::info!(url = %next, attempt = session.failover_attempts, "switching to backup server");
        session.stream_url = next.clone();
        player
            .play(&next, &format!("{title} (backup server)"), &[])
            .await?;
        Ok(next)
    }

    async fn replace_current(&mut self, session: PlaybackSession) {
        if let Some(mut prev) = self.current.replace(session) {
            self.teardown(&mut prev).await;
        }
    }
}

fn blank_session(hash: &str, file_id: &str, quality: Quality) -> PlaybackSession {
    PlaybackSession {
        session_id: None,
        source_hash: hash.to_string(),
        file_id: file_id.to_string(),
        quality,
        stream_url: String::new(),
        state: SessionState::Idle,
        backups: Vec::new(),
        failover_attempts: 0,
    }
}
