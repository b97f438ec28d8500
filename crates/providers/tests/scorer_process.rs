#![cfg(unix)]

use providers::{
    LineChannel, ScoreProvider, ScorerCommand, ScorerError, ScorerKind, ScorerManager,
    ScorerSettings,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const READY: &str = "echo 'scorer initialized and ready' >&2;";

fn sh(script: &str) -> ScorerCommand {
    ScorerCommand::new("sh", ["-c", script, "scorer"])
}

fn settings(script: &str) -> ScorerSettings {
    ScorerSettings {
        tagger: sh(script),
        general_rater: sh(script),
        anime_rater: sh(script),
        ready_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        ..ScorerSettings::default()
    }
}

#[tokio::test]
async fn concurrent_requests_pair_with_their_own_lines() {
    let script = format!(
        "{} n=0; while IFS= read -r line; do n=$((n+1)); echo \"r$n $line\"; done",
        READY
    );
    let channel =
        LineChannel::spawn("test", &sh(&script), "initialized and ready", None).unwrap();
    channel.wait_ready(Duration::from_secs(5)).await.unwrap();

    let (x, y, z) = tokio::join!(
        channel.request("/img/x.png"),
        channel.request("/img/y.png"),
        channel.request("/img/z.png"),
    );
    let (x, y, z) = (x.unwrap(), y.unwrap(), z.unwrap());
    assert!(x.ends_with(" /img/x.png"), "{}", x);
    assert!(y.ends_with(" /img/y.png"), "{}", y);
    assert!(z.ends_with(" /img/z.png"), "{}", z);
    let mut seq: Vec<_> = [&x, &y, &z]
        .iter()
        .map(|r| r.split(' ').next().unwrap().to_string())
        .collect();
    seq.sort();
    assert_eq!(seq, vec!["r1", "r2", "r3"]);
    channel.terminate();
}

#[tokio::test]
async fn non_utf8_output_is_decoded_lossily_and_keeps_the_process_alive() {
    // Latin-1 bytes on stderr before the marker, after every request, and in
    // the replies themselves.
    let script = format!(
        "printf 'loading caf\\351.png\\n' >&2; {} \
         while IFS= read -r line; do \
           printf 'warn caf\\351\\n' >&2; \
           printf 'pok\\351mon,%s\\n' \"$line\"; \
         done",
        READY
    );
    let channel =
        LineChannel::spawn("test", &sh(&script), "initialized and ready", None).unwrap();
    channel.wait_ready(Duration::from_secs(5)).await.unwrap();

    for path in ["/img/a.png", "/img/b.png", "/img/c.png"] {
        let reply = channel.request(path).await.unwrap();
        assert_eq!(reply, format!("pok\u{FFFD}mon,{}", path));
    }
    assert!(!channel.is_closed());
    channel.terminate();
}

#[tokio::test]
async fn batched_replies_resolve_in_request_order() {
    // Reads all three requests before answering any of them.
    let script = format!(
        "{} read -r a; read -r b; read -r c; echo r1; echo r2; echo r3; sleep 5",
        READY
    );
    let channel =
        LineChannel::spawn("test", &sh(&script), "initialized and ready", None).unwrap();
    channel.wait_ready(Duration::from_secs(5)).await.unwrap();

    let first = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request("/x").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request("/y").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let third = channel.request("/z").await.unwrap();

    assert_eq!(first.await.unwrap().unwrap(), "r1");
    assert_eq!(second.await.unwrap().unwrap(), "r2");
    assert_eq!(third, "r3");
    channel.terminate();
}

#[tokio::test]
async fn manager_reuses_a_compatible_process() {
    let script = format!(
        "{} n=0; while IFS= read -r line; do n=$((n+1)); echo \"$n\"; done",
        READY
    );
    let manager = ScorerManager::new(settings(&script));

    let a = manager.score(ScorerKind::GeneralRater, Path::new("/a")).await.unwrap();
    let b = manager.score(ScorerKind::GeneralRater, Path::new("/b")).await.unwrap();

    assert_eq!((a.as_str(), b.as_str()), ("1", "2"));
    assert_eq!(manager.current_kind().await, Some(ScorerKind::GeneralRater));
    manager.shutdown().await;
    assert_eq!(manager.current_kind().await, None);
}

#[tokio::test]
async fn tagger_threshold_change_respawns() {
    let script = format!("{} while IFS= read -r line; do echo \"$1\"; done", READY);
    let manager = ScorerManager::new(settings(&script));

    let low = manager
        .score(ScorerKind::Tagger { threshold: 0.3 }, Path::new("/a"))
        .await
        .unwrap();
    let high = manager
        .score(ScorerKind::Tagger { threshold: 0.5 }, Path::new("/a"))
        .await
        .unwrap();

    assert_eq!(low, "0.3");
    assert_eq!(high, "0.5");
    assert_eq!(
        manager.current_kind().await,
        Some(ScorerKind::Tagger { threshold: 0.5 })
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn exit_before_ready_fails_the_wait() {
    let manager = ScorerManager::new(settings("echo 'model missing' >&2; exit 3"));

    let err = manager
        .score(ScorerKind::AnimeRater, Path::new("/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScorerError::ExitedBeforeReady(_)), "{:?}", err);
    assert_eq!(manager.current_kind().await, None);
}

#[tokio::test]
async fn ready_wait_is_bounded() {
    let mut settings = settings("sleep 5");
    settings.ready_timeout = Duration::from_millis(200);
    let manager = ScorerManager::new(settings);

    let err = manager
        .score(ScorerKind::GeneralRater, Path::new("/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScorerError::ReadyTimeout(_)), "{:?}", err);
    assert_eq!(manager.current_kind().await, None);
}

#[tokio::test]
async fn concurrent_callers_share_one_startup() {
    let script = format!(
        "sleep 0.2; {} while IFS= read -r line; do echo \"$$\"; done",
        READY
    );
    let manager = Arc::new(ScorerManager::new(settings(&script)));

    let (a, b) = tokio::join!(
        manager.score(ScorerKind::GeneralRater, Path::new("/a")),
        manager.score(ScorerKind::GeneralRater, Path::new("/b")),
    );

    // Same pid means both requests went to one process.
    assert_eq!(a.unwrap(), b.unwrap());
    manager.shutdown().await;
}

#[tokio::test]
async fn terminate_rejects_in_flight_request() {
    let script = format!("{} while IFS= read -r line; do sleep 10; done", READY);
    let manager = Arc::new(ScorerManager::new(settings(&script)));
    manager.ensure_ready(ScorerKind::GeneralRater).await.unwrap();

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.request_score(Path::new("/slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.terminate().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ScorerError::ClosedPrematurely), "{:?}", err);
}

#[tokio::test]
async fn crash_mid_request_clears_the_handle() {
    let script = format!("{} read -r line; exit 1", READY);
    let manager = ScorerManager::new(settings(&script));

    let err = manager
        .score(ScorerKind::GeneralRater, Path::new("/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScorerError::ClosedPrematurely), "{:?}", err);
    assert_eq!(manager.current_kind().await, None);
}

#[tokio::test]
async fn request_timeout_discards_the_process() {
    let mut settings = settings(&format!("{} sleep 10", READY));
    settings.request_timeout = Duration::from_millis(200);
    let manager = ScorerManager::new(settings);

    let err = manager
        .score(ScorerKind::GeneralRater, Path::new("/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScorerError::RequestTimeout(_)), "{:?}", err);
    assert_eq!(manager.current_kind().await, None);
}

#[tokio::test]
async fn request_without_process_is_not_attached() {
    let manager = ScorerManager::new(settings("true"));
    let err = manager.request_score(Path::new("/a")).await.unwrap_err();
    assert!(matches!(err, ScorerError::NotAttached));
}
