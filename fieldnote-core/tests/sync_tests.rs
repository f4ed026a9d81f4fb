//! Offline sync engine integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use fieldnote_common::{EventBus, NoteStatus};
use fieldnote_core::pipeline::Pipeline;
use fieldnote_core::session::SessionManager;
use fieldnote_core::store::notes;
use fieldnote_core::sync::{connectivity_channel, SyncEngine};
use fieldnote_core::vault::{CredentialVault, TokenSet, TOKEN_AI, TOKEN_REPO};
use fieldnote_core::BackendClient;

const PASSWORD: &str = "correcthorse1";

async fn engine_with(
    pool: &SqlitePool,
    backend_url: &str,
    online: bool,
) -> (Arc<SyncEngine>, tokio::sync::watch::Sender<bool>) {
    let vault = CredentialVault::new(pool.clone());
    let mut tokens = TokenSet::new();
    tokens.insert(TOKEN_AI.to_string(), "sk_xyz".to_string());
    tokens.insert(TOKEN_REPO.to_string(), "ghp_abc".to_string());
    vault.setup("Sam Field", PASSWORD, tokens).await.unwrap();

    let events = EventBus::new(64);
    let session = Arc::new(SessionManager::new(
        pool.clone(),
        vault,
        events.clone(),
    ));
    session.login(PASSWORD).await.unwrap();

    let pipeline = Arc::new(Pipeline::new(
        pool.clone(),
        BackendClient::new(backend_url),
        session,
        events.clone(),
    ));

    let (tx, rx) = connectivity_channel(online);
    let engine = Arc::new(
        SyncEngine::new(pool.clone(), pipeline, events, rx)
            .with_interval(Duration::from_secs(3600)),
    );
    (engine, tx)
}

/// Stub whose transcription endpoint takes ~300 ms, long enough to overlap
/// concurrent pass attempts
async fn spawn_slow_backend() -> String {
    let app = Router::new()
        .route(
            "/api/ai/transcribe",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Json(json!({"text": "Met with Acme about interns"}))
            }),
        )
        .route(
            "/api/ai/chat",
            post(|Json(_body): Json<Value>| async {
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content":
                        "{\"matched_company_id\": null, \"confidence\": \"low\", \"reasoning\": \"none\"}"
                    }}]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn pass_processes_pending_notes() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_HIT).await;
    let (engine, _tx) = engine_with(&pool, &backend, true).await;

    let note_id = notes::insert(&pool, vec![0u8; 64], "audio/mpeg")
        .await
        .unwrap();

    let summary = engine.sync_pending_notes().await.unwrap().unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Transcribed);
    assert_eq!(note.selected_company_id.as_deref(), Some("acme-1"));
}

#[tokio::test]
async fn pass_skips_notes_that_progressed_past_recorded() {
    let (_dir, pool) = common::test_pool().await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let (engine, _tx) = engine_with(&pool, &backend, true).await;

    let note_id = notes::insert(&pool, vec![0u8; 64], "audio/mpeg")
        .await
        .unwrap();
    notes::set_transcription(&pool, &note_id, "already transcribed")
        .await
        .unwrap();

    let summary = engine.sync_pending_notes().await.unwrap().unwrap();
    assert_eq!(summary.scanned, 0);

    // Untouched
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.transcription.as_deref(), Some("already transcribed"));
}

#[tokio::test]
async fn offline_engine_drops_the_trigger() {
    let (_dir, pool) = common::test_pool().await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let (engine, _tx) = engine_with(&pool, &backend, false).await;

    notes::insert(&pool, vec![0u8; 64], "audio/mpeg")
        .await
        .unwrap();

    assert!(engine.sync_pending_notes().await.unwrap().is_none());
}

#[tokio::test]
async fn only_one_pass_runs_at_a_time() {
    let (_dir, pool) = common::test_pool().await;
    let backend = spawn_slow_backend().await;
    let (engine, _tx) = engine_with(&pool, &backend, true).await;

    let note_id = notes::insert(&pool, vec![0u8; 64], "audio/mpeg")
        .await
        .unwrap();

    // Two triggers racing: the guard must drop exactly one
    let (a, b) = tokio::join!(engine.sync_pending_notes(), engine.sync_pending_notes());
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(
        a.is_some() != b.is_some(),
        "exactly one pass should run, got {a:?} / {b:?}"
    );

    // The note went through the pipeline exactly once
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Transcribed);
}

#[tokio::test]
async fn connectivity_regained_triggers_a_pass() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let (engine, tx) = engine_with(&pool, &backend, false).await;

    let note_id = notes::insert(&pool, vec![0u8; 64], "audio/mpeg")
        .await
        .unwrap();

    tokio::spawn(engine.clone().run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Still offline: nothing processed
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Recorded);

    // Going online kicks a pass
    tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Transcribed);
}
