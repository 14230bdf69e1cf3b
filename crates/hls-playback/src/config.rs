use crate::clock::RetryPolicy;
use crate::env::StreamEnv;
use crate::errors::{PlaybackError, Result};
use crate::model::Quality;
use crate::poller::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};
use crate::store::{DEFAULT_MAX_AGE_DAYS, DEFAULT_MIN_RESUME_SECS};
use crate::tracker::{DEFAULT_RESTORE_ATTEMPTS, DEFAULT_RESTORE_INTERVAL_MS, DEFAULT_SAVE_INTERVAL};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilesVia {
    /// `GET /orchestrator/torrents/{hash}/files`
    #[default]
    Orchestrator,
    /// `POST /torrents` with `action:get`
    TorrentDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    pub config_version: u32,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_balancer_url")]
    pub balancer_url: String,
    // `user:password` for HTTP Basic
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub quality_preference: Quality,
    #[serde(default)]
    pub ask_quality: bool,
    #[serde(default = "default_true")]
    pub use_sessions: bool,
    #[serde(default)]
    pub files_via: FilesVia,
    #[serde(default)]
    pub auto_play: bool,
    #[serde(default)]
    pub show_logs: bool,
    // Readiness polling
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    // Resume tracking
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    #[serde(default = "default_min_resume_secs")]
    pub min_resume_secs: u32,
    #[serde(default = "default_resume_max_age_days")]
    pub resume_max_age_days: u32,
    #[serde(default = "default_restore_attempts")]
    pub restore_attempts: u32,
    #[serde(default = "default_restore_interval_ms")]
    pub restore_interval_ms: u64,
    #[serde(default)]
    pub backup_origins: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            backend_url: default_backend_url(),
            balancer_url: default_balancer_url(),
            credentials: None,
            enabled: true,
            quality_preference: Quality::default(),
            ask_quality: false,
            use_sessions: true,
            files_via: FilesVia::default(),
            auto_play: false,
            show_logs: false,
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            save_interval_secs: default_save_interval_secs(),
            min_resume_secs: default_min_resume_secs(),
            resume_max_age_days: default_resume_max_age_days(),
            restore_attempts: default_restore_attempts(),
            restore_interval_ms: default_restore_interval_ms(),
            backup_origins: Vec::new(),
        }
    }
}

impl PlaybackConfig {
    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.poll_attempts, self.poll_interval_ms)
    }

    pub fn restore_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.restore_attempts, self.restore_interval_ms)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    /// Overlay environment overrides on top of the persisted values.
    pub fn with_env(mut self, env: &StreamEnv) -> Self {
        if let Some(url) = &env.backend_url {
            self.backend_url = url.clone();
        }
        if let Some(url) = &env.balancer_url {
            self.balancer_url = url.clone();
        }
        if let Some(auth) = &env.credentials {
            self.credentials = Some(auth.clone());
        }
        if let Some(q) = env.quality {
            self.quality_preference = q;
        }
        if let Some(show) = env.show_logs {
            self.show_logs = show;
        }
        self
    }

    /// Apply a partial config patch from JSON with validation.
    /// Unknown keys are ignored; numbers are clamped to sane ranges.
    pub fn apply_patch(&mut self, patch: serde_json::Value) -> Result<&PlaybackConfig> {
        use serde_json::Value as V;
        let obj = match patch {
            V::Object(m) => m,
            _ => {
                return Err(PlaybackError::InvalidInput(
                    "config patch must be an object".into(),
                ))
            }
        };

        let number = |key: &str, min: u64, max: u64| -> Result<Option<u64>> {
            let Some(v) = obj.get(key) else { return Ok(None) };
            let n = match v {
                V::Number(n) => n.as_u64().ok_or_else(|| {
                    PlaybackError::InvalidInput(format!("{key} must be a non-negative integer"))
                })?,
                V::String(s) => s.trim().parse::<u64>().map_err(|_| {
                    PlaybackError::InvalidInput(format!("{key} must be an integer"))
                })?,
                _ => return Err(PlaybackError::InvalidInput(format!("{key} must be a number"))),
            };
            Ok(Some(n.clamp(min, max)))
        };
        let flag = |key: &str| -> Option<bool> {
            match obj.get(key) {
                Some(V::Bool(b)) => Some(*b),
                Some(V::String(s)) => match s.as_str() {
                    "1" | "true" | "on" | "yes" => Some(true),
                    "0" | "false" | "off" | "no" => Some(false),
                    _ => None,
                },
                _ => None,
            }
        };

        for (key, field) in [
            ("backend_url", &mut self.backend_url),
            ("balancer_url", &mut self.balancer_url),
        ] {
            if let Some(V::String(s)) = obj.get(key) {
                *field = validate_url(key, s)?;
            }
        }
        if let Some(v) = obj.get("credentials") {
            self.credentials = match v {
                V::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            };
        }
        if let Some(V::String(s)) = obj.get("quality_preference") {
            self.quality_preference = s.parse()?;
        }
        if let Some(V::String(s)) = obj.get("files_via") {
            self.files_via = match s.as_str() {
                "orchestrator" => FilesVia::Orchestrator,
                "torrent_detail" => FilesVia::TorrentDetail,
                _ => {
                    return Err(PlaybackError::InvalidInput(
                        "files_via must be one of: orchestrator, torrent_detail".into(),
                    ))
                }
            };
        }
        if let Some(V::Array(items)) = obj.get("backup_origins") {
            let mut origins = Vec::with_capacity(items.len());
            for item in items {
                if let V::String(s) = item {
                    origins.push(validate_url("backup_origins", s)?);
                }
            }
            self.backup_origins = origins;
        }

        if let Some(b) = flag("enabled") {
            self.enabled = b;
        }
        if let Some(b) = flag("ask_quality") {
            self.ask_quality = b;
        }
        if let Some(b) = flag("use_sessions") {
            self.use_sessions = b;
        }
        if let Some(b) = flag("auto_play") {
            self.auto_play = b;
        }
        if let Some(b) = flag("show_logs") {
            self.show_logs = b;
        }

        if let Some(n) = number("poll_attempts", 1, 600)? {
            self.poll_attempts = n as u32;
        }
        if let Some(n) = number("poll_interval_ms", 100, 60_000)? {
            self.poll_interval_ms = n;
        }
        if let Some(n) = number("save_interval_secs", 1, 600)? {
            self.save_interval_secs = n;
        }
        if let Some(n) = number("min_resume_secs", 0, 3_600)? {
            self.min_resume_secs = n as u32;
        }
        if let Some(n) = number("resume_max_age_days", 1, 365)? {
            self.resume_max_age_days = n as u32;
        }
        if let Some(n) = number("restore_attempts", 1, 120)? {
            self.restore_attempts = n as u32;
        }
        if let Some(n) = number("restore_interval_ms", 100, 60_000)? {
            self.restore_interval_ms = n;
        }
        Ok(self)
    }
}

fn validate_url(key: &str, s: &str) -> Result<String> {
    let t = s.trim().trim_end_matches('/');
    match url::Url::parse(t) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(t.to_string()),
        _ => Err(PlaybackError::InvalidInput(format!(
            "{key} must be an http(s) URL, got '{s}'"
        ))),
    }
}

pub struct ConfigPaths {
    pub dir: PathBuf,
    pub file: PathBuf,
    pub store: PathBuf,
}

pub fn config_paths() -> Result<ConfigPaths> {
    let proj = ProjectDirs::from("org", "hls-playback", "hls-playback").ok_or_else(|| {
        PlaybackError::Config("unable to resolve config directory".into())
    })?;
    let dir = proj.config_dir().to_path_buf();
    let file = dir.join("playback.json");
    let store = dir.join("storage.json");
    Ok(ConfigPaths { dir, file, store })
}

pub fn load_or_default() -> Result<PlaybackConfig> {
    load_from(&config_paths()?.file)
}

pub fn save(cfg: &PlaybackConfig) -> Result<()> {
    save_to(cfg, &config_paths()?.file)
}

pub fn load_from(path: &Path) -> Result<PlaybackConfig> {
    if path.exists() {
        let text = fs::read_to_string(path)?;
        let mut cfg: PlaybackConfig = serde_json::from_str(&text)?;
        migrate(&mut cfg);
        Ok(cfg)
    } else {
        Ok(PlaybackConfig::default())
    }
}

pub fn save_to(cfg: &PlaybackConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let text = serde_json::to_string_pretty(cfg)?;
    fs::write(path, text)?;
    Ok(())
}

fn migrate(cfg: &mut PlaybackConfig) {
    if cfg.config_version == 0 {
        cfg.config_version = 1;
    }
    if cfg.config_version == 1 {
        // v2 adds the resume controls; zero means the field predates them
        if cfg.save_interval_secs == 0 { cfg.save_interval_secs = default_save_interval_secs(); }
        if cfg.resume_max_age_days == 0 { cfg.resume_max_age_days = default_resume_max_age_days(); }
        if cfg.restore_attempts == 0 { cfg.restore_attempts = default_restore_attempts(); }
        if cfg.restore_interval_ms == 0 { cfg.restore_interval_ms = default_restore_interval_ms(); }
        cfg.config_version = 2;
    }
    if cfg.config_version == 2 {
        // v3 adds polling controls
        if cfg.poll_attempts == 0 { cfg.poll_attempts = default_poll_attempts(); }
        if cfg.poll_interval_ms == 0 { cfg.poll_interval_ms = default_poll_interval_ms(); }
        cfg.config_version = 3;
    }
}

/// Public helper to migrate an in-memory config (useful for tests)
pub fn migrate_public(cfg: &mut PlaybackConfig) {
    migrate(cfg)
}


// Defaults
fn default_true() -> bool { true }
fn default_backend_url() -> String { "http://localhost:8090".to_string() }
fn default_balancer_url() -> String { "http://localhost:8080".to_string() }
fn default_poll_attempts() -> u32 { DEFAULT_POLL_ATTEMPTS }
fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL_MS }
fn default_save_interval_secs() -> u64 { DEFAULT_SAVE_INTERVAL.as_secs() }
fn default_min_resume_secs() -> u32 { DEFAULT_MIN_RESUME_SECS as u32 }
fn default_resume_max_age_days() -> u32 { DEFAULT_MAX_AGE_DAYS }
fn default_restore_attempts() -> u32 { DEFAULT_RESTORE_ATTEMPTS }
fn default_restore_interval_ms() -> u64 { DEFAULT_RESTORE_INTERVAL_MS }
