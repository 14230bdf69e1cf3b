//! Known backend response shapes and their normalization into the crate's
//! canonical `Source` / `FileDescriptor` types.
//!
//! Supported file-list layouts:
//! - a bare array (orchestrator `/orchestrator/torrents/{hash}/files`)
//! - `{ "file_stats": [...] }` (torrent detail, `action:get`)
//! - `{ "data": { "TorrServer": { "Files": [...] } } }`, where `data` may also
//!   arrive as a JSON-encoded string

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{PlaybackError, Result};
use crate::model::{AddResult, FileDescriptor, Source};

/// Body of a backend response: JSON when it parses, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => ResponseBody::Json(v),
            Err(_) => ResponseBody::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Num(i64),
    Str(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Num(n) => n.to_string(),
            WireId::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireFile {
    id: WireId,
    path: String,
    #[serde(alias = "length", alias = "size_bytes", default)]
    size: i64,
}

impl From<WireFile> for FileDescriptor {
    fn from(f: WireFile) -> Self {
        FileDescriptor {
            id: f.id.into_string(),
            path: f.path,
            size_bytes: f.size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TorrServerFiles {
    #[serde(rename = "Files", default)]
    files: Vec<WireFile>,
}

#[derive(Debug, Deserialize)]
struct LegacyPayload {
    #[serde(rename = "TorrServer")]
    torr_server: Option<TorrServerFiles>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyData {
    Object(LegacyPayload),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    #[serde(default)]
    file_stats: Option<Vec<WireFile>>,
    #[serde(default)]
    data: Option<LegacyData>,
    #[serde(default)]
    stat_string: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FilesShape {
    List(Vec<WireFile>),
    Detail(DetailBody),
}

/// Normalize any known file-list shape. Unknown or empty bodies yield no files.
pub fn normalize_files(body: ResponseBody) -> Result<Vec<FileDescriptor>> {
    let value = match body {
        ResponseBody::Json(v) => v,
        ResponseBody::Text(t) if t.trim().is_empty() => return Ok(vec![]),
        ResponseBody::Text(t) => {
            return Err(PlaybackError::Transport(format!(
                "unexpected text response for file list: {}",
                truncate(&t)
            )))
        }
    };
    if value.is_null() {
        return Ok(vec![]);
    }
    let shape: FilesShape = serde_json::from_value(value)?;
    Ok(match shape {
        FilesShape::List(files) => files.into_iter().map(Into::into).collect(),
        FilesShape::Detail(detail) => {
            if let Some(status) = detail.stat_string.as_deref() {
                tracing::debug!(%status, "torrent detail status");
            }
            detail_files(detail)?
        }
    })
}

fn detail_files(detail: DetailBody) -> Result<Vec<FileDescriptor>> {
    if let Some(stats) = detail.file_stats {
        if !stats.is_empty() {
            return Ok(stats.into_iter().map(Into::into).collect());
        }
    }
    let payload = match detail.data {
        Some(LegacyData::Object(p)) => p,
        Some(LegacyData::Encoded(s)) if !s.trim().is_empty() => {
            serde_json::from_str::<LegacyPayload>(&s)?
        }
        _ => return Ok(vec![]),
    };
    Ok(payload
        .torr_server
        .map(|t| t.files.into_iter().map(Into::into).collect())
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct WireSource {
    hash: String,
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default, alias = "torrent_size", alias = "size")]
    size_bytes: i64,
    #[serde(default, alias = "stat_string")]
    status_text: String,
}

pub fn normalize_sources(body: ResponseBody) -> Result<Vec<Source>> {
    let value = match body {
        ResponseBody::Json(Value::Null) => return Ok(vec![]),
        ResponseBody::Json(v) => v,
        ResponseBody::Text(t) if t.trim().is_empty() => return Ok(vec![]),
        ResponseBody::Text(t) => {
            return Err(PlaybackError::Transport(format!(
                "unexpected text response for source list: {}",
                truncate(&t)
            )))
        }
    };
    let wire: Vec<WireSource> = serde_json::from_value(value)?;
    Ok(wire
        .into_iter()
        .map(|w| Source {
            hash: w.hash,
            title: w.title,
            size_bytes: w.size_bytes,
            status_text: w.status_text,
        })
        .collect())
}

pub fn normalize_added(body: ResponseBody) -> Result<AddResult> {
    let hash = body
        .as_json()
        .and_then(|v| v.get("hash"))
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| PlaybackError::Transport("add response carried no hash".into()))?;
    let title = body
        .as_json()
        .and_then(|v| v.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(AddResult {
        hash: hash.to_string(),
        title,
    })
}

/// Extract the session id from a create-session response, if any.
pub fn session_id_of(body: &ResponseBody) -> Option<String> {
    let v = body.as_json()?;
    let id = v.get("session_id").or_else(|| v.get("id"))?;
    match id {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Error text carried by a status response, if the backend reported one.
pub fn status_error(body: &ResponseBody) -> Option<String> {
    let v = body.as_json()?;
    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        return Some(err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string()));
    }
    match v.get("status").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("failed") => {
            Some(s.to_string())
        }
        _ => None,
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_falls_back_to_text() {
        assert_eq!(
            ResponseBody::parse("{\"a\":1}".into()),
            ResponseBody::Json(json!({"a": 1}))
        );
        assert_eq!(
            ResponseBody::parse("Ok".into()),
            ResponseBody::Text("Ok".into())
        );
    }

    #[test]
    fn files_from_bare_array() {
        let body = ResponseBody::Json(json!([
            { "id": "0", "path": "a.mkv", "size": 10 },
            { "id": 1, "path": "b.srt", "length": 2 }
        ]));
        let files = normalize_files(body).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].id, "1");
        assert_eq!(files[1].size_bytes, 2);
    }

    #[test]
    fn files_from_file_stats() {
        let body = ResponseBody::Json(json!({
            "stat_string": "Torrent working",
            "file_stats": [{ "id": 1, "path": "Movie/movie.mp4", "length": 700 }]
        }));
        let files = normalize_files(body).unwrap();
        assert_eq!(files[0].path, "Movie/movie.mp4");
        assert_eq!(files[0].size_bytes, 700);
    }

    #[test]
    fn files_from_nested_encoded_data() {
        let data = json!({ "TorrServer": { "Files": [{ "id": 3, "path": "x.mkv", "length": 5 }] } });
        let body = ResponseBody::Json(json!({ "data": data.to_string() }));
        let files = normalize_files(body).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "3");
    }

    #[test]
    fn metadata_pending_is_empty() {
        let body = ResponseBody::Json(json!({ "stat_string": "Torrent getting info" }));
        assert!(normalize_files(body).unwrap().is_empty());
        assert!(normalize_files(ResponseBody::Text(String::new())).unwrap().is_empty());
    }

    #[test]
    fn sources_accept_torrserver_fields() {
        let body = ResponseBody::Json(json!([
            { "hash": "abc", "title": "Movie", "torrent_size": 42, "stat_string": "Torrent working" }
        ]));
        let sources = normalize_sources(body).unwrap();
        assert_eq!(sources[0].size_bytes, 42);
        assert_eq!(sources[0].status_text, "Torrent working");
    }

    #[test]
    fn session_id_and_status_errors() {
        assert_eq!(
            session_id_of(&ResponseBody::Json(json!({ "session_id": "s-1" }))),
            Some("s-1".into())
        );
        assert_eq!(session_id_of(&ResponseBody::Json(json!({ "session_id": "" }))), None);
        assert_eq!(session_id_of(&ResponseBody::Text("created".into())), None);
        assert!(status_error(&ResponseBody::Json(json!({ "status": "started" }))).is_none());
        assert_eq!(
            status_error(&ResponseBody::Json(json!({ "error": "ffmpeg missing" }))),
            Some("ffmpeg missing".into())
        );
    }
}
