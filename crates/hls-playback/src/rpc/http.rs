use crate::config::{FilesVia, PlaybackConfig};
use crate::errors::{PlaybackError, Result};
use crate::model::{AddResult, BalancerPlay, FileDescriptor, Quality, Source};
use crate::rpc::shapes::{self, ResponseBody};
use crate::rpc::TorrentBackend;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::{json, Value};

pub struct HttpBackend {
    pub base_url: String,
    pub balancer_url: String,
    credentials: Option<(String, Option<String>)>,
    files_via: FilesVia,
    client: Client,
}

impl HttpBackend {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url = normalize_base(base_url.into());
        Self {
            balancer_url: base_url.clone(),
            base_url,
            credentials: None,
            files_via: FilesVia::Orchestrator,
            client,
        }
    }

    pub fn from_config(cfg: &PlaybackConfig) -> Self {
        let mut backend = Self::new(cfg.backend_url.clone())
            .with_balancer(cfg.balancer_url.clone())
            .with_files_via(cfg.files_via);
        if let Some(creds) = cfg.credentials.as_deref() {
            backend = backend.with_credentials(creds);
        }
        backend
    }

    /// Attach HTTP Basic credentials from a `user:password` string.
    pub fn with_credentials(mut self, user_pass: &str) -> Self {
        let user_pass = user_pass.trim();
        if user_pass.is_empty() {
            self.credentials = None;
            return self;
        }
        self.credentials = Some(match user_pass.split_once(':') {
            Some((user, pass)) => (user.to_string(), Some(pass.to_string())),
            None => (user_pass.to_string(), None),
        });
        self
    }

    pub fn with_balancer<S: Into<String>>(mut self, balancer_url: S) -> Self {
        self.balancer_url = normalize_base(balancer_url.into());
        self
    }

    pub fn with_files_via(mut self, via: FilesVia) -> Self {
        self.files_via = via;
        self
    }

    /// Issue one request against the backend. No retries happen here.
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<ResponseBody> {
        self.request_at(&self.base_url, endpoint, method, body).await
    }

    async fn request_at(
        &self,
        base: &str,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<ResponseBody> {
        let url = join(base, endpoint);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, pass.as_deref());
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| {
            PlaybackError::Transport(format!("{method} {endpoint} failed: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PlaybackError::Transport(format!(
                "{method} {endpoint}: HTTP {}",
                status.as_u16()
            )));
        }
        let text = resp.text().await.map_err(|e| {
            PlaybackError::Transport(format!("{method} {endpoint} body: {e}"))
        })?;
        tracing::trace!(%endpoint, bytes = text.len(), "backend response");
        Ok(ResponseBody::parse(text))
    }

    async fn torrent_detail(&self, hash: &str) -> Result<ResponseBody> {
        self.request(
            "/torrents",
            Method::POST,
            Some(&json!({ "action": "get", "hash": hash })),
        )
        .await
    }
}

#[async_trait::async_trait]
impl TorrentBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn stream_base(&self) -> &str {
        &self.base_url
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let body = self
            .request("/torrents", Method::POST, Some(&json!({ "action": "list" })))
            .await?;
        shapes::normalize_sources(body)
    }

    async fn add_source(&self, link: &str, title: &str) -> Result<AddResult> {
        let body = self
            .request(
                "/torrents",
                Method::POST,
                Some(&json!({
                    "action": "add",
                    "link": link,
                    "title": title,
                    "save_to_db": true,
                })),
            )
            .await?;
        shapes::normalize_added(body)
    }

    async fn list_files(&self, hash: &str) -> Result<Vec<FileDescriptor>> {
        let body = match self.files_via {
            FilesVia::Orchestrator => {
                self.request(
                    &format!("/orchestrator/torrents/{hash}/files"),
                    Method::GET,
                    None,
                )
                .await?
            }
            FilesVia::TorrentDetail => self.torrent_detail(hash).await?,
        };
        shapes::normalize_files(body)
    }

    async fn create_session(&self, hash: &str, file_id: &str) -> Result<String> {
        let body = self
            .request(
                "/orchestrator/session",
                Method::POST,
                Some(&json!({ "torrent_hash": hash, "file_id": file_id })),
            )
            .await?;
        shapes::session_id_of(&body).ok_or_else(|| {
            PlaybackError::SessionCreate(format!("no session_id returned for {hash}/{file_id}"))
        })
    }

    async fn start_session(&self, session_id: &str, quality: Quality) -> Result<()> {
        let body = self
            .request(
                &format!("/orchestrator/session/{session_id}/start"),
                Method::POST,
                Some(&json!({ "quality": quality })),
            )
            .await?;
        match shapes::status_error(&body) {
            Some(err) => Err(PlaybackError::SessionStart(err)),
            None => Ok(()),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.request(
            &format!("/orchestrator/session/{session_id}"),
            Method::DELETE,
            None,
        )
        .await
        .map(|_| ())
    }

    async fn request_play(
        &self,
        imdb_id: &str,
        user_id: &str,
        quality: Quality,
    ) -> Result<BalancerPlay> {
        let body = self
            .request_at(
                &self.balancer_url,
                "/api/v1/content/play",
                Method::POST,
                Some(&json!({
                    "imdb_id": imdb_id,
                    "user_id": user_id,
                    "quality_preference": quality,
                })),
            )
            .await?;
        match body {
            ResponseBody::Json(v) => Ok(serde_json::from_value(v)?),
            ResponseBody::Text(t) => Err(PlaybackError::Transport(format!(
                "balancer returned non-JSON body: {t}"
            ))),
        }
    }
}

fn normalize_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

fn join(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}
