use crate::clock::Clock;
use crate::errors::Result;
use crate::model::PositionRecord;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_MIN_RESUME_SECS: f64 = 10.0;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;
const USER_ID_KEY: &str = "streaming_user_id";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Persistent key-value collaborator provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        if let Ok(mut e) = self.entries.lock() {
            e.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Ok(mut e) = self.entries.lock() {
            e.remove(key);
        }
        Ok(())
    }
}

/// Whole-file JSON object store; every write rewrites the file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let text = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let snapshot = match self.entries.lock() {
            Ok(mut e) => {
                e.insert(key.to_string(), value);
                e.clone()
            }
            Err(_) => return Ok(()),
        };
        self.flush(&snapshot)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let snapshot = match self.entries.lock() {
            Ok(mut e) => {
                if e.remove(key).is_none() {
                    return Ok(());
                }
                e.clone()
            }
            Err(_) => return Ok(()),
        };
        self.flush(&snapshot)
    }
}

/// Resume points keyed by `(source hash, file id)`.
#[derive(Clone)]
pub struct PositionStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    min_offset_secs: f64,
    max_age_ms: i64,
}

impl PositionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            min_offset_secs: DEFAULT_MIN_RESUME_SECS,
            max_age_ms: DEFAULT_MAX_AGE_DAYS as i64 * DAY_MS,
        }
    }

    pub fn with_limits(mut self, min_offset_secs: f64, max_age_days: u32) -> Self {
        self.min_offset_secs = min_offset_secs;
        self.max_age_ms = max_age_days as i64 * DAY_MS;
        self
    }

    pub fn key(hash: &str, file_id: &str) -> String {
        format!("hls_position_{hash}_{file_id}")
    }

    /// Persist an offset. Offsets at or below the minimum are ignored.
    pub fn save(&self, hash: &str, file_id: &str, offset_seconds: f64) -> Result<()> {
        if !offset_seconds.is_finite() || offset_seconds <= self.min_offset_secs {
            return Ok(());
        }
        let record = PositionRecord {
            source_hash: hash.to_string(),
            file_id: file_id.to_string(),
            offset_seconds,
            saved_at_epoch_ms: self.clock.now_ms(),
        };
        self.kv
            .set(&Self::key(hash, file_id), serde_json::to_value(&record)?)
    }

    /// Stored offset, or `0.0` when there is none or it has expired.
    pub fn load(&self, hash: &str, file_id: &str) -> f64 {
        self.record(hash, file_id)
            .map(|r| r.offset_seconds)
            .unwrap_or(0.0)
    }

    /// The live record, if present and not expired. Stale records stay in the store.
    pub fn record(&self, hash: &str, file_id: &str) -> Option<PositionRecord> {
        let raw = self.kv.get(&Self::key(hash, file_id))?;
        let record: PositionRecord = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%hash, %file_id, error = %e, "unreadable position record");
                return None;
            }
        };
        if self.clock.now_ms() - record.saved_at_epoch_ms > self.max_age_ms {
            return None;
        }
        Some(record)
    }

    pub fn clear(&self, hash: &str, file_id: &str) -> Result<()> {
        self.kv.remove(&Self::key(hash, file_id))
    }
}

/// Stable anonymous id for balancer requests, generated on first use.
pub fn user_id(kv: &dyn KeyValueStore) -> Result<String> {
    if let Some(id) = kv.get(USER_ID_KEY).and_then(|v| v.as_str().map(str::to_string)) {
        if !id.is_empty() {
            return Ok(id);
        }
    }
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..13)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    let id = format!("user_{suffix}");
    kv.set(USER_ID_KEY, Value::String(id.clone()))?;
    Ok(id)
}
