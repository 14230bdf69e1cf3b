use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hls_playback::clock::SystemClock;
use hls_playback::config::{self, PlaybackConfig};
use hls_playback::errors::PlaybackError;
use hls_playback::env::load_env;
use hls_playback::orchestrator::normalize_source_link;
use hls_playback::poller::wait_for_files;
use hls_playback::selector::select_best_video;
use hls_playback::session::SessionManager;
use hls_playback::store::{self, JsonFileStore, PositionStore};
use hls_playback::tracker::format_offset;
use hls_playback::{HttpBackend, Quality, TorrentBackend};
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Torrent-to-HLS playback client")]
struct Cli {
    /// Override the backend base URL
    #[arg(long, global = true)]
    backend: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sources known to the backend
    Sources,
    /// Add a magnet link (or bare info hash) as a new source
    Add {
        magnet: String,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// List the files of a source
    Files {
        hash: String,
        /// Poll until metadata is ready
        #[arg(long)]
        wait: bool,
    },
    /// Create and start a streaming session, then print its URL
    Open {
        hash: String,
        /// File id (defaults to the largest video file)
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        quality: Option<String>,
    },
    /// Delete a backend session
    Stop { session_id: String },
    /// Show the saved resume point of a file
    Position { hash: String, file_id: String },
    /// Ask the balancer for a stream by external id
    Balance { imdb_id: String },
    /// Show or change settings
    Config {
        /// key=value pairs, e.g. --set quality_preference=720p
        #[arg(long = "set")]
        set: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let (cfg, load_err) = loaded_or_default(config::load_or_default());
    let cfg = cfg.with_env(&load_env());
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cfg.show_logs, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();
    if let Some(e) = load_err {
        tracing::warn!(error = %e, "config unreadable, using defaults");
    }

    if let Err(e) = real_main(cfg).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("hls-playback: {e:#}");
        std::process::exit(1);
    }
}

/// `show_logs` picks the default level; `RUST_LOG` directives still apply on top.
fn log_filter(show_logs: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if show_logs { Level::DEBUG } else { Level::INFO };
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(rust_log.unwrap_or_default())
}

fn loaded_or_default(
    res: Result<PlaybackConfig, PlaybackError>,
) -> (PlaybackConfig, Option<PlaybackError>) {
    match res {
        Ok(cfg) => (cfg, None),
        Err(e) => (PlaybackConfig::default(), Some(e)),
    }
}

async fn real_main(mut cfg: PlaybackConfig) -> Result<()> {
    let cli = Cli::parse();
    if let Some(url) = cli.backend {
        cfg.apply_patch(serde_json::json!({ "backend_url": url }))?;
    }
    let backend: Arc<dyn TorrentBackend> = Arc::new(HttpBackend::from_config(&cfg));

    match cli.command {
        Commands::Sources => {
            let sources = backend.list_sources().await?;
            println!("{}", serde_json::to_string_pretty(&sources)?);
        }
        Commands::Add { magnet, title } => {
            let link = normalize_source_link(&magnet)?;
            let added = backend.add_source(&link, &title).await?;
            println!("{}", added.hash);
        }
        Commands::Files { hash, wait } => {
            let files = if wait {
                wait_for_files(backend.as_ref(), &SystemClock, &hash, cfg.poll_policy()).await
            } else {
                backend.list_files(&hash).await?
            };
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        Commands::Open { hash, file, quality } => {
            let quality = match quality {
                Some(q) => q.parse::<Quality>()?,
                None => cfg.quality_preference,
            };
            let file_id = match file {
                Some(id) => id,
                None => {
                    let files =
                        wait_for_files(backend.as_ref(), &SystemClock, &hash, cfg.poll_policy())
                            .await;
                    select_best_video(&files)
                        .map(|f| f.id.clone())
                        .ok_or_else(|| anyhow!("no playable video file in {hash}"))?
                }
            };
            let mut sessions = SessionManager::new(backend.clone());
            let session = if cfg.use_sessions {
                sessions.create_and_start(&hash, &file_id, quality).await?
            } else {
                sessions.open_direct(&hash, &file_id, quality).await
            };
            info!(session_id = ?session.session_id, %file_id, "stream ready");
            println!("{}", session.stream_url);
        }
        Commands::Stop { session_id } => {
            backend.delete_session(&session_id).await?;
            println!("stopped {session_id}");
        }
        Commands::Position { hash, file_id } => {
            let kv = Arc::new(open_store()?);
            let positions = PositionStore::new(kv, Arc::new(SystemClock))
                .with_limits(cfg.min_resume_secs as f64, cfg.resume_max_age_days);
            match positions.record(&hash, &file_id) {
                Some(r) => println!(
                    "{} (saved at {} ms)",
                    format_offset(r.offset_seconds),
                    r.saved_at_epoch_ms
                ),
                None => println!("no resume point"),
            }
        }
        Commands::Balance { imdb_id } => {
            let kv = open_store()?;
            let user_id = store::user_id(&kv)?;
            let play = backend
                .request_play(&imdb_id, &user_id, cfg.quality_preference)
                .await?;
            println!("{}", play.stream_url);
            for backup in &play.backup_torrservers {
                println!("backup: {backup}");
            }
        }
        Commands::Config { set } => {
            // Persist only the file values, not the env overlay
            let mut stored = config::load_or_default()?;
            if !set.is_empty() {
                let mut patch = serde_json::Map::new();
                for pair in &set {
                    let (k, v) = pair
                        .split_once('=')
                        .ok_or_else(|| anyhow!("expected key=value, got '{pair}'"))?;
                    let value = serde_json::from_str(v)
                        .unwrap_or_else(|_| serde_json::Value::String(v.to_string()));
                    patch.insert(k.trim().to_string(), value);
                }
                stored.apply_patch(serde_json::Value::Object(patch))?;
                config::save(&stored)?;
            }
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
    }
    Ok(())
}

fn open_store() -> Result<JsonFileStore> {
    let paths = config::config_paths()?;
    JsonFileStore::open(&paths.store)
        .with_context(|| format!("opening {}", paths.store.display()))
}
