use crate::model::Quality;
use std::env;

#[derive(Debug, Clone, Default)]
pub struct StreamEnv {
    pub backend_url: Option<String>,
    pub balancer_url: Option<String>,
    pub credentials: Option<String>,
    pub quality: Option<Quality>,
    pub show_logs: Option<bool>,
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
}

pub fn load_env() -> StreamEnv {
    let quality = env_string("HLS_QUALITY").and_then(|q| match q.parse::<Quality>() {
        Ok(q) => Some(q),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring HLS_QUALITY");
            None
        }
    });
    StreamEnv {
        backend_url: env_string("HLS_BACKEND_URL"),
        balancer_url: env_string("HLS_BALANCER_URL"),
        credentials: env_string("HLS_BACKEND_AUTH"),
        quality,
        show_logs: env_bool("HLS_SHOW_LOGS"),
    }
}
