//! Torrent readiness polling: wait until the backend knows a source's file list.

use crate::clock::{Clock, RetryPolicy};
use crate::model::FileDescriptor;
use crate::rpc::TorrentBackend;

pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Poll `list_files` until it returns something or the budget runs out.
///
/// Exhaustion is not an error: the last fetched (possibly empty) list is
/// returned and the caller decides how to fail. Transport errors on a single
/// attempt count as an empty answer.
pub async fn wait_for_files(
    backend: &dyn TorrentBackend,
    clock: &dyn Clock,
    hash: &str,
    policy: RetryPolicy,
) -> Vec<FileDescriptor> {
    let mut last = Vec::new();
    for attempt in 1..=policy.max_attempts {
        match backend.list_files(hash).await {
            Ok(files) if !files.is_empty() => {
                tracing::debug!(%hash, attempt, count = files.len(), "files ready");
                return files;
            }
            Ok(files) => {
                tracing::debug!(%hash, attempt, "metadata not ready yet");
                last = files;
            }
            Err(e) => {
                tracing::warn!(%hash, attempt, error = %e, "file listing failed");
            }
        }
        if attempt < policy.max_attempts {
            clock.sleep(policy.interval).await;
        }
    }
    tracing::info!(%hash, attempts = policy.max_attempts, "gave up waiting for files");
    last
}
