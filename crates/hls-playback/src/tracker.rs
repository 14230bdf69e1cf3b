//! Background sampling of the playback offset, and resume-point restore.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::clock::{Clock, RetryPolicy};
use crate::player::Player;
use crate::store::PositionStore;
use crate::ui::UiPrompt;

pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RESTORE_ATTEMPTS: u32 = 15;
pub const DEFAULT_RESTORE_INTERVAL_MS: u64 = 1_000;

struct Cycle {
    hash: String,
    file_id: String,
    last_offset: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

pub struct PositionTracker {
    store: PositionStore,
    player: Arc<dyn Player>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cycle: Mutex<Option<Cycle>>,
}

impl PositionTracker {
    pub fn new(store: PositionStore, player: Arc<dyn Player>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            player,
            clock,
            interval: DEFAULT_SAVE_INTERVAL,
            cycle: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// `(hash, file_id)` of the active cycle, if any.
    pub fn tracking(&self) -> Option<(String, String)> {
        let guard = self.cycle.lock().ok()?;
        guard.as_ref().map(|c| (c.hash.clone(), c.file_id.clone()))
    }

    /// Begin sampling for `(hash, file_id)`, stopping any previous cycle first.
    pub async fn start(&self, hash: &str, file_id: &str) {
        let last_offset = Arc::new(AtomicU64::new(f64::NAN.to_bits()));
        let handle = tokio::spawn(sample_loop(
            self.store.clone(),
            self.player.clone(),
            self.clock.clone(),
            self.interval,
            hash.to_string(),
            file_id.to_string(),
            last_offset.clone(),
        ));
        let next = Cycle {
            hash: hash.to_string(),
            file_id: file_id.to_string(),
            last_offset,
            handle,
        };
        let prev = match self.cycle.lock() {
            Ok(mut guard) => guard.replace(next),
            Err(_) => {
                next.handle.abort();
                return;
            }
        };
        tracing::debug!(%hash, %file_id, "position tracking started");
        if let Some(prev) = prev {
            self.finish(prev);
        }
    }

    /// Cancel the cycle and save the last known offset once more.
    pub async fn stop(&self) {
        let prev = self.cycle.lock().ok().and_then(|mut g| g.take());
        if let Some(prev) = prev {
            self.finish(prev);
        }
    }

    fn finish(&self, cycle: Cycle) {
        cycle.handle.abort();
        let offset = f64::from_bits(cycle.last_offset.load(Ordering::SeqCst));
        if offset.is_finite() {
            if let Err(e) = self.store.save(&cycle.hash, &cycle.file_id, offset) {
                tracing::warn!(hash = %cycle.hash, error = %e, "final position save failed");
            }
        }
        tracing::debug!(hash = %cycle.hash, file_id = %cycle.file_id, offset, "position tracking stopped");
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.cycle.lock() {
            if let Some(c) = guard.take() {
                c.handle.abort();
            }
        }
    }
}

async fn sample_loop(
    store: PositionStore,
    player: Arc<dyn Player>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    hash: String,
    file_id: String,
    last_offset: Arc<AtomicU64>,
) {
    loop {
        clock.sleep(interval).await;
        let offset = match player.current_time().await {
            Ok(t) if t.is_finite() && t >= 0.0 => t,
            Ok(t) => {
                tracing::debug!(%hash, offset = t, "ignoring unusable offset");
                continue;
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "position sample skipped");
                continue;
            }
        };
        last_offset.store(offset.to_bits(), Ordering::SeqCst);
        if let Err(e) = store.save(&hash, &file_id, offset) {
            tracing::warn!(%hash, error = %e, "position save failed");
        }
    }
}

/// Wait for the player to buffer enough, then seek to `offset` and tell the user.
///
/// Returns false when the player never became ready; playback then simply
/// continues from the start.
pub async fn restore_position(
    player: &dyn Player,
    ui: &dyn UiPrompt,
    clock: &dyn Clock,
    offset: f64,
    policy: RetryPolicy,
) -> bool {
    for attempt in 1..=policy.max_attempts {
        if player.is_ready().await {
            match player.seek(offset).await {
                Ok(()) => {
                    ui.notify(&format!("Resuming from {}", format_offset(offset)));
                    tracing::info!(offset, attempt, "playback position restored");
                    return true;
                }
                Err(e) => tracing::warn!(offset, error = %e, "seek failed"),
            }
        }
        if attempt < policy.max_attempts {
            clock.sleep(policy.interval).await;
        }
    }
    tracing::info!(offset, "player never became ready, restore abandoned");
    false
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_offset(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
