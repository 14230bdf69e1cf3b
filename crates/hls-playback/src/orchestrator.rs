use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::PlaybackConfig;
use crate::errors::{PlaybackError, Result};
use crate::model::{ContentRef, PlaybackSession, Quality, Source};
use crate::player::{Player, PlayerEvent};
use crate::poller::wait_for_files;
use crate::rpc::TorrentBackend;
use crate::selector::select_best_video;
use crate::session::SessionManager;
use crate::store::{self, KeyValueStore, PositionStore};
use crate::tracker::{restore_position, PositionTracker};
use crate::ui::{LoadingGuard, UiPrompt};

pub const ADD_NEW_SOURCE: &str = "+ Add new source";

/// Host-side collaborators the orchestrator drives.
pub struct Collaborators {
    pub backend: Arc<dyn TorrentBackend>,
    pub ui: Arc<dyn UiPrompt>,
    pub player: Arc<dyn Player>,
    pub kv: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

/// Single entry point: turns "play this content" into a running stream.
///
/// Owns the one current session and the one current tracking cycle; starting
/// a new `play` supersedes both.
pub struct Orchestrator {
    cfg: PlaybackConfig,
    backend: Arc<dyn TorrentBackend>,
    ui: Arc<dyn UiPrompt>,
    player: Arc<dyn Player>,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    positions: PositionStore,
    sessions: Arc<Mutex<SessionManager>>,
    tracker: Arc<PositionTracker>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(cfg: PlaybackConfig, parts: Collaborators) -> Self {
        let positions = PositionStore::new(parts.kv.clone(), parts.clock.clone())
            .with_limits(cfg.min_resume_secs as f64, cfg.resume_max_age_days);
        let tracker = PositionTracker::new(
            positions.clone(),
            parts.player.clone(),
            parts.clock.clone(),
        )
        .with_interval(cfg.save_interval());
        Self {
            sessions: Arc::new(Mutex::new(SessionManager::new(parts.backend.clone()))),
            tracker: Arc::new(tracker),
            positions,
            backend: parts.backend,
            ui: parts.ui,
            player: parts.player,
            kv: parts.kv,
            clock: parts.clock,
            listener: std::sync::Mutex::new(None),
            cfg,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.cfg
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub async fn current_session(&self) -> Option<PlaybackSession> {
        self.sessions.lock().await.current().cloned()
    }

    /// Play `content` through the torrent backend.
    ///
    /// Any failure is reported to the user once and the loading indicator is
    /// always cleared; the error is still returned to the caller.
    pub async fn play(&self, content: &ContentRef) -> Result<PlaybackSession> {
        let res = self.try_play(content).await;
        self.report(res)
    }

    /// Play `content` through the balancer, which picks the server and hands
    /// back backup origins for failover.
    pub async fn play_balanced(&self, content: &ContentRef) -> Result<PlaybackSession> {
        let res = self.try_play_balanced(content).await;
        self.report(res)
    }

    /// Stop tracking and tear down the current session.
    pub async fn stop(&self) {
        if let Some(handle) = self.listener.lock().ok().and_then(|mut l| l.take()) {
            handle.abort();
        }
        self.tracker.stop().await;
        if let Some(s) = self.sessions.lock().await.teardown_current().await {
            tracing::debug!(hash = %s.source_hash, "previous session torn down");
        }
    }

    async fn try_play(&self, content: &ContentRef) -> Result<PlaybackSession> {
        self.ensure_enabled()?;
        self.stop().await;
        let loading = LoadingGuard::new(self.ui.as_ref());

        let source = self.choose_source(content).await?;
        let hash = source.hash.clone();
        let files = wait_for_files(
            self.backend.as_ref(),
            self.clock.as_ref(),
            &hash,
            self.cfg.poll_policy(),
        )
        .await;
        let file = select_best_video(&files).cloned().ok_or_else(|| {
            PlaybackError::NoVideoFileFound(format!("{} files listed for {hash}", files.len()))
        })?;
        tracing::info!(backend = self.backend.name(), %hash, file_id = %file.id, path = %file.path, "selected video file");

        let resume_at = self.positions.load(&hash, &file.id);
        let quality = self.choose_quality().await?;

        let events = self.player.subscribe();
        {
            let mut sessions = self.sessions.lock().await;
            if self.cfg.use_sessions {
                sessions.create_and_start(&hash, &file.id, quality).await?;
            } else {
                sessions.open_direct(&hash, &file.id, quality).await;
            }
            if !self.cfg.backup_origins.is_empty() {
                sessions.attach_backups(self.cfg.backup_origins.clone());
            }
        }
        let session = self.hand_to_player(&content.title).await?;
        drop(loading);

        self.tracker.start(&hash, &file.id).await;
        self.spawn_listener(events, content.title.clone());
        if resume_at > 0.0 {
            restore_position(
                self.player.as_ref(),
                self.ui.as_ref(),
                self.clock.as_ref(),
                resume_at,
                self.cfg.restore_policy(),
            )
            .await;
        }
        Ok(session)
    }

    async fn try_play_balanced(&self, content: &ContentRef) -> Result<PlaybackSession> {
        self.ensure_enabled()?;
        let imdb_id = content
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlaybackError::InvalidInput("content has no external id".into()))?;
        self.stop().await;
        let loading = LoadingGuard::new(self.ui.as_ref());

        let user_id = store::user_id(self.kv.as_ref())?;
        let play = self
            .backend
            .request_play(imdb_id, &user_id, self.cfg.quality_preference)
            .await?;
        tracing::info!(%imdb_id, url = %play.stream_url, backups = play.backup_torrservers.len(), "balancer answered");
        let quality = play
            .quality
            .as_deref()
            .and_then(|q| q.parse::<Quality>().ok())
            .unwrap_or(self.cfg.quality_preference);

        let events = self.player.subscribe();
        self.sessions
            .lock()
            .await
            .adopt_stream(&play.stream_url, quality, play.backup_torrservers)
            .await;
        let session = self.hand_to_player(&content.title).await?;
        drop(loading);
        self.spawn_listener(events, content.title.clone());
        Ok(session)
    }

    async fn hand_to_player(&self, title: &str) -> Result<PlaybackSession> {
        let mut sessions = self.sessions.lock().await;
        let url = sessions
            .current()
            .map(|s| s.stream_url.clone())
            .ok_or_else(|| PlaybackError::SessionCreate("no current session".into()))?;
        if let Err(e) = self.player.play(&url, title, &[]).await {
            sessions.teardown_current().await;
            return Err(e);
        }
        sessions.mark_playing();
        sessions
            .current()
            .cloned()
            .ok_or_else(|| PlaybackError::SessionCreate("session vanished".into()))
    }

    async fn choose_source(&self, content: &ContentRef) -> Result<Source> {
        let sources = self.backend.list_sources().await?;
        if sources.is_empty() {
            return self.add_source(content).await;
        }
        let mut items: Vec<String> = sources
            .iter()
            .map(|s| {
                if s.status_text.is_empty() {
                    s.title.clone()
                } else {
                    format!("{} [{}]", s.title, s.status_text)
                }
            })
            .collect();
        items.push(ADD_NEW_SOURCE.to_string());
        match self.ui.show_choice("Select source", &items).await? {
            None => Err(PlaybackError::Cancelled),
            Some(i) if i < sources.len() => Ok(sources[i].clone()),
            Some(_) => self.add_source(content).await,
        }
    }

    async fn add_source(&self, content: &ContentRef) -> Result<Source> {
        let raw = self
            .ui
            .show_text_input("Magnet link")
            .await?
            .ok_or(PlaybackError::Cancelled)?;
        let link = normalize_source_link(&raw)?;
        let added = self.backend.add_source(&link, &content.title).await?;
        tracing::info!(hash = %added.hash, "source added");
        Ok(Source {
            hash: added.hash,
            title: added.title.unwrap_or_else(|| content.title.clone()),
            size_bytes: 0,
            status_text: String::new(),
        })
    }

    async fn choose_quality(&self) -> Result<Quality> {
        if !self.cfg.ask_quality {
            return Ok(self.cfg.quality_preference);
        }
        let items: Vec<String> = Quality::ALL.iter().map(|q| q.to_string()).collect();
        match self.ui.show_choice("Quality", &items).await? {
            Some(i) => Quality::ALL
                .get(i)
                .copied()
                .ok_or_else(|| PlaybackError::InvalidInput(format!("quality index {i}"))),
            None => Err(PlaybackError::Cancelled),
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.cfg.enabled {
            Ok(())
        } else {
            Err(PlaybackError::Config("streaming is disabled in settings".into()))
        }
    }

    fn report(&self, res: Result<PlaybackSession>) -> Result<PlaybackSession> {
        match res {
            Ok(s) => Ok(s),
            Err(PlaybackError::Cancelled) => {
                tracing::info!("playback cancelled by user");
                Err(PlaybackError::Cancelled)
            }
            Err(e) => {
                tracing::error!(error = %e, "play failed");
                self.ui.notify(&e.user_message());
                Err(e)
            }
        }
    }

    fn spawn_listener(&self, events: broadcast::Receiver<PlayerEvent>, title: String) {
        let handle = tokio::spawn(listen(
            events,
            title,
            self.sessions.clone(),
            self.tracker.clone(),
            self.positions.clone(),
            self.player.clone(),
            self.ui.clone(),
        ));
        let prev = match self.listener.lock() {
            Ok(mut l) => l.replace(handle),
            Err(_) => {
                handle.abort();
                None
            }
        };
        if let Some(prev) = prev {
            prev.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Ok(mut l) = self.listener.lock() {
            if let Some(h) = l.take() {
                h.abort();
            }
        }
    }
}

async fn listen(
    mut events: broadcast::Receiver<PlayerEvent>,
    title: String,
    sessions: Arc<Mutex<SessionManager>>,
    tracker: Arc<PositionTracker>,
    positions: PositionStore,
    player: Arc<dyn Player>,
    ui: Arc<dyn UiPrompt>,
) {
    loop {
        let event = match events.recv().await {
            Ok(ev) => ev,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "player events lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            PlayerEvent::Started => tracing::debug!("player started"),
            PlayerEvent::Error(msg) => {
                tracing::warn!(error = %msg, "player error, attempting failover");
                let res = sessions.lock().await.failover(player.as_ref(), &title).await;
                match res {
                    Ok(url) => tracing::info!(%url, "failover switched stream"),
                    Err(PlaybackError::AllSourcesExhausted) => {
                        tracker.stop().await;
                        ui.notify(&PlaybackError::AllSourcesExhausted.user_message());
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failover failed");
                        ui.notify(&e.user_message());
                    }
                }
            }
            PlayerEvent::Ended => {
                tracker.stop().await;
                if let Some(s) = sessions.lock().await.teardown_current().await {
                    if !s.file_id.is_empty() {
                        if let Err(e) = positions.clear(&s.source_hash, &s.file_id) {
                            tracing::warn!(error = %e, "clearing finished position failed");
                        }
                    }
                }
                break;
            }
            PlayerEvent::Destroyed => {
                tracker.stop().await;
                sessions.lock().await.teardown_current().await;
                break;
            }
        }
    }
}

/// Accept a magnet URI or a bare 40-hex info hash; anything else is `InvalidInput`.
pub fn normalize_source_link(raw: &str) -> Result<String> {
    let link = raw.trim();
    if link.len() == 40 && link.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(format!("magnet:?xt=urn:btih:{link}"));
    }
    if !link.starts_with("magnet:?") {
        return Err(PlaybackError::InvalidInput("expected a magnet URI".into()));
    }
    match extract_btih(link) {
        Some(h) if is_info_hash(h) => Ok(link.to_string()),
        _ => Err(PlaybackError::InvalidInput(
            "magnet URI carries no valid btih hash".into(),
        )),
    }
}

fn extract_btih(s: &str) -> Option<&str> {
    let idx = s.find("urn:btih:")?;
    let sub = &s[idx + 9..];
    let end = sub.find('&').unwrap_or(sub.len());
    Some(&sub[..end])
}

fn is_info_hash(h: &str) -> bool {
    (h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
        || (h.len() == 32 && h.chars().all(|c| c.is_ascii_alphanumeric()))
}
