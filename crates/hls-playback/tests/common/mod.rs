#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hls_playback::clock::ManualClock;
use hls_playback::config::PlaybackConfig;
use hls_playback::errors::{PlaybackError, Result};
use hls_playback::player::{Player, PlayerEvent, Subtitle};
use hls_playback::store::MemoryStore;
use hls_playback::ui::UiPrompt;
use hls_playback::{Collaborators, Orchestrator, TorrentBackend};
use tokio::sync::broadcast;

pub const HASH: &str = "0123456789abcdef0123456789abcdef01234567";
pub const START_MS: i64 = 1_700_000_000_000;

pub struct FakePlayer {
    events: broadcast::Sender<PlayerEvent>,
    pub played: Mutex<Vec<(String, String)>>,
    pub seeks: Mutex<Vec<f64>>,
    pub position: Mutex<Option<f64>>,
    /// `is_ready` answers true from this call number on (1-based); 0 = never.
    pub ready_from_call: AtomicU32,
    pub ready_calls: AtomicU32,
    pub fail_play: AtomicBool,
}

impl FakePlayer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            played: Mutex::new(Vec::new()),
            seeks: Mutex::new(Vec::new()),
            position: Mutex::new(None),
            ready_from_call: AtomicU32::new(1),
            ready_calls: AtomicU32::new(0),
            fail_play: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, ev: PlayerEvent) {
        let _ = self.events.send(ev);
    }

    pub fn set_position(&self, secs: Option<f64>) {
        *self.position.lock().unwrap() = secs;
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.played.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Player for FakePlayer {
    async fn play(&self, url: &str, title: &str, _subtitles: &[Subtitle]) -> Result<()> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(PlaybackError::Transport("player refused url".into()));
        }
        self.played
            .lock()
            .unwrap()
            .push((url.to_string(), title.to_string()));
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        self.position
            .lock()
            .unwrap()
            .ok_or_else(|| PlaybackError::Transport("player not ready".into()))
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.seeks.lock().unwrap().push(seconds);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        let n = self.ready_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let from = self.ready_from_call.load(Ordering::SeqCst);
        from != 0 && n >= from
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct FakeUi {
    choices: Mutex<VecDeque<Option<usize>>>,
    inputs: Mutex<VecDeque<Option<String>>>,
    pub prompts: Mutex<Vec<Vec<String>>>,
    pub notifications: Mutex<Vec<String>>,
    pub loading_depth: AtomicI32,
    pub loading_starts: AtomicU32,
}

impl FakeUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_choice(&self, c: Option<usize>) {
        self.choices.lock().unwrap().push_back(c);
    }

    pub fn push_input(&self, s: Option<&str>) {
        self.inputs.lock().unwrap().push_back(s.map(str::to_string));
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl UiPrompt for FakeUi {
    async fn show_choice(&self, _title: &str, items: &[String]) -> Result<Option<usize>> {
        self.prompts.lock().unwrap().push(items.to_vec());
        Ok(self.choices.lock().unwrap().pop_front().flatten())
    }

    async fn show_text_input(&self, _title: &str) -> Result<Option<String>> {
        Ok(self.inputs.lock().unwrap().pop_front().flatten())
    }

    fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }

    fn loading_start(&self) {
        self.loading_starts.fetch_add(1, Ordering::SeqCst);
        self.loading_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn loading_stop(&self) {
        self.loading_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub player: Arc<FakePlayer>,
    pub ui: Arc<FakeUi>,
    pub kv: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(cfg: PlaybackConfig, backend: Arc<dyn TorrentBackend>) -> Harness {
    let player = Arc::new(FakePlayer::new());
    let ui = Arc::new(FakeUi::new());
    let kv = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START_MS));
    let orchestrator = Orchestrator::new(
        cfg,
        Collaborators {
            backend,
            ui: ui.clone(),
            player: player.clone(),
            kv: kv.clone(),
            clock: clock.clone(),
        },
    );
    Harness {
        orchestrator,
        player,
        ui,
        kv,
        clock,
    }
}

/// Give spawned tasks (listener, tracker) real time to react.
pub async fn settle_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
