mod common;

use std::sync::Arc;

use common::FakePlayer;
use httpmock::{Method::DELETE, Method::POST, MockServer};
use hls_playback::errors::PlaybackError;
use hls_playback::session::SessionManager;
use hls_playback::{HttpBackend, Quality, SessionState, TorrentBackend};

fn session_mocks<'a>(server: &'a MockServer, file_id: &str, id: &str) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/orchestrator/session")
            .json_body_partial(format!(r#"{{"torrent_hash":"aa11","file_id":"{file_id}"}}"#));
        then.status(200)
            .header("content-type", "application/json")
            .body(format!(r#"{{"session_id":"{id}"}}"#));
    });
    let start = server.mock(|when, then| {
        when.method(POST).path(format!("/orchestrator/session/{id}/start"));
        then.status(200).body(r#"{"status":"started"}"#);
    });
    (create, start)
}

fn backend(server: &MockServer) -> Arc<dyn TorrentBackend> {
    Arc::new(HttpBackend::new(server.base_url()))
}

#[tokio::test]
async fn create_and_start_builds_session_url() {
    let server = MockServer::start();
    let (create, start) = session_mocks(&server, "0", "s1");

    let mut sessions = SessionManager::new(backend(&server));
    let session = sessions
        .create_and_start("aa11", "0", Quality::Fhd1080)
        .await
        .unwrap();

    create.assert_hits(1);
    start.assert_hits(1);
    assert_eq!(session.session_id.as_deref(), Some("s1"));
    assert_eq!(session.state, SessionState::Ready);
    assert_eq!(
        session.stream_url,
        format!("{}/orchestrator/s1/master.m3u8", server.base_url())
    );
    assert_eq!(sessions.current(), Some(&session));
}

#[tokio::test]
async fn new_session_replaces_and_deletes_previous() {
    let server = MockServer::start();
    let (create_a, start_a) = session_mocks(&server, "0", "a");
    let (create_b, start_b) = session_mocks(&server, "1", "b");
    let delete_a = server.mock(|when, then| {
        when.method(DELETE).path("/orchestrator/session/a");
        then.status(200);
    });
    let delete_b = server.mock(|when, then| {
        when.method(DELETE).path("/orchestrator/session/b");
        then.status(200);
    });

    let mut sessions = SessionManager::new(backend(&server));
    sessions.create_and_start("aa11", "0", Quality::Hd720).await.unwrap();
    sessions.create_and_start("aa11", "1", Quality::Hd720).await.unwrap();

    create_a.assert_hits(1);
    start_a.assert_hits(1);
    create_b.assert_hits(1);
    start_b.assert_hits(1);
    delete_a.assert_hits(1);
    delete_b.assert_hits(0);
    assert_eq!(
        sessions.current().and_then(|s| s.session_id.as_deref()),
        Some("b")
    );
}

#[tokio::test]
async fn start_failure_deletes_allocated_session() {
    let server = MockServer::start();
    let _create = server.mock(|when, then| {
        when.method(POST).path("/orchestrator/session");
        then.status(200).body(r#"{"id":"s9"}"#);
    });
    let _start = server.mock(|when, then| {
        when.method(POST).path("/orchestrator/session/s9/start");
        then.status(500);
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/orchestrator/session/s9");
        then.status(200);
    });

    let mut sessions = SessionManager::new(backend(&server));
    let err = sessions
        .create_and_start("aa11", "0", Quality::Fhd1080)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::SessionStart(_)), "got {err:?}");
    delete.assert_hits(1);
    assert!(sessions.current().is_none());
}

#[tokio::test]
async fn create_transport_failure_keeps_transport_kind() {
    let server = MockServer::start();
    let _create = server.mock(|when, then| {
        when.method(POST).path("/orchestrator/session");
        then.status(502);
    });

    let mut sessions = SessionManager::new(backend(&server));
    let err = sessions
        .create_and_start("aa11", "0", Quality::Fhd1080)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Transport(_)), "got {err:?}");
    assert!(sessions.current().is_none());
}

#[tokio::test]
async fn create_without_id_is_create_error() {
    let server = MockServer::start();
    let _create = server.mock(|when, then| {
        when.method(POST).path("/orchestrator/session");
        then.status(200).body(r#"{"status":"queued"}"#);
    });

    let mut sessions = SessionManager::new(backend(&server));
    let err = sessions
        .create_and_start("aa11", "0", Quality::Fhd1080)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::SessionCreate(_)), "got {err:?}");
}

#[tokio::test]
async fn teardown_swallows_delete_errors() {
    let server = MockServer::start();
    let _mocks = session_mocks(&server, "0", "s1");
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/orchestrator/session/s1");
        then.status(500);
    });

    let mut sessions = SessionManager::new(backend(&server));
    sessions.create_and_start("aa11", "0", Quality::Fhd1080).await.unwrap();
    let stopped = sessions.teardown_current().await.unwrap();

    delete.assert_hits(1);
    assert_eq!(stopped.state, SessionState::Stopped);
    assert!(sessions.current().is_none());
    // nothing left to tear down
    assert!(sessions.teardown_current().await.is_none());
}

#[tokio::test]
async fn direct_stream_has_no_backend_session() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(DELETE).path_contains("/orchestrator/session/");
        then.status(200);
    });

    let mut sessions = SessionManager::new(backend(&server));
    let s = sessions.open_direct("aa11", "2", Quality::Sd480).await;
    assert_eq!(s.stream_url, format!("{}/hls/aa11/2/master.m3u8", server.base_url()));
    assert!(s.session_id.is_none());
    sessions.teardown_current().await;
    delete.assert_hits(0);
}

#[tokio::test]
async fn failover_walks_backups_in_order_then_gives_up() {
    let server = MockServer::start();
    let player = FakePlayer::new();
    let mut sessions = SessionManager::new(backend(&server));
    sessions
        .adopt_stream(
            "http://main:8090/hls/tt42/master.m3u8?t=1",
            Quality::Fhd1080,
            vec!["http://b1:8090".into(), "http://b2:8090/".into()],
        )
        .await;
    sessions.mark_playing();

    let first = sessions.failover(&player, "Movie").await.unwrap();
    assert_eq!(first, "http://b1:8090/hls/tt42/master.m3u8");
    let second = sessions.failover(&player, "Movie").await.unwrap();
    assert_eq!(second, "http://b2:8090/hls/tt42/master.m3u8");

    let err = sessions.failover(&player, "Movie").await.unwrap_err();
    assert!(matches!(err, PlaybackError::AllSourcesExhausted));
    assert_eq!(sessions.current().map(|s| s.state), Some(SessionState::Failed));

    // a failed session stays failed
    let err = sessions.failover(&player, "Movie").await.unwrap_err();
    assert!(matches!(err, PlaybackError::AllSourcesExhausted));
    assert_eq!(sessions.current().map(|s| s.state), Some(SessionState::Failed));

    let played = player.played.lock().unwrap().clone();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0].1, "Movie (backup server)");
    assert_eq!(played[1].0, second);
}

#[tokio::test]
async fn failover_without_backups_is_exhausted_immediately() {
    let server = MockServer::start();
    let player = FakePlayer::new();
    let mut sessions = SessionManager::new(backend(&server));
    let err = sessions.failover(&player, "Movie").await.unwrap_err();
    assert!(matches!(err, PlaybackError::AllSourcesExhausted));

    sessions.open_direct("aa11", "0", Quality::Fhd1080).await;
    let err = sessions.failover(&player, "Movie").await.unwrap_err();
    assert!(matches!(err, PlaybackError::AllSourcesExhausted));
    assert!(player.played_urls().is_empty());
}

#[tokio::test]
async fn failover_from_backend_session_uses_direct_url() {
    let server = MockServer::start();
    let _mocks = session_mocks(&server, "0", "s1");
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/orchestrator/session/s1");
        then.status(200);
    });
    let player = FakePlayer::new();

    let mut sessions = SessionManager::new(backend(&server));
    sessions.create_and_start("aa11", "0", Quality::Fhd1080).await.unwrap();
    sessions.attach_backups(vec!["http://b1:8090".into()]);
    sessions.mark_playing();

    let next = sessions.failover(&player, "Movie").await.unwrap();
    assert_eq!(next, "http://b1:8090/hls/aa11/0/master.m3u8");
    assert_eq!(player.played_urls(), vec![next]);

    let err = sessions.failover(&player, "Movie").await.unwrap_err();
    assert!(matches!(err, PlaybackError::AllSourcesExhausted));
    delete.assert_hits(1);
    let failed = sessions.current().unwrap();
    assert_eq!(failed.state, SessionState::Failed);

    // teardown of a failed session makes no second delete
    let gone = sessions.teardown_current().await.unwrap();
    assert_eq!(gone.state, SessionState::Failed);
    delete.assert_hits(1);
}
