//! Processing pipeline integration tests against a stub proxy backend

mod common;

use std::sync::Arc;

use sqlx::SqlitePool;

use fieldnote_common::{EventBus, NoteStatus};
use fieldnote_core::pipeline::{Pipeline, PipelineError};
use fieldnote_core::session::SessionManager;
use fieldnote_core::store::notes;
use fieldnote_core::vault::{CredentialVault, TokenSet, TOKEN_AI, TOKEN_REPO};
use fieldnote_core::BackendClient;

const PASSWORD: &str = "correcthorse1";

async fn pipeline_with(
    pool: &SqlitePool,
    backend_url: &str,
    tokens: &[(&str, &str)],
) -> Pipeline {
    let vault = CredentialVault::new(pool.clone());
    let token_set: TokenSet = tokens
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vault.setup("Sam Field", PASSWORD, token_set).await.unwrap();

    let session = Arc::new(SessionManager::new(
        pool.clone(),
        vault,
        EventBus::new(64),
    ));
    session.login(PASSWORD).await.unwrap();

    Pipeline::new(
        pool.clone(),
        BackendClient::new(backend_url),
        session,
        EventBus::new(64),
    )
}

async fn recorded_note(pool: &SqlitePool) -> String {
    notes::insert(pool, vec![0u8; 128], "audio/mpeg")
        .await
        .unwrap()
}

#[tokio::test]
async fn full_manual_flow_reaches_sent() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let pipeline = pipeline_with(
        &pool,
        &backend,
        &[(TOKEN_AI, "sk_xyz"), (TOKEN_REPO, "ghp_abc")],
    )
    .await;

    let note_id = recorded_note(&pool).await;

    // Transcribe: RECORDED -> TRANSCRIBED with text stored
    pipeline.transcribe(&note_id).await.unwrap();
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Transcribed);
    assert!(note.transcription.as_deref().unwrap().contains("Acme"));

    // Matcher finds nothing: status unchanged, no selection
    let matched = pipeline.match_company(&note_id).await.unwrap();
    assert!(matched.is_none());
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Transcribed);
    assert!(note.selected_company_id.is_none());

    // Manual selection, then enhancement: -> PROCESSED with extracted date
    pipeline
        .set_company_and_contact(&note_id, "acme-1", Some("ct-1"))
        .await
        .unwrap();
    pipeline
        .enhance_text(&note_id, "acme-1", Some("ct-1"))
        .await
        .unwrap();
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Processed);
    assert!(note.processed_text.as_deref().unwrap().contains("Meeting Notes"));
    assert_eq!(note.conversation_date.as_deref(), Some("05.03.2025"));

    // Submission: -> SENT with issue reference recorded
    let issue = pipeline.submit(&note_id).await.unwrap();
    assert_eq!(issue.number, 7);
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Sent);
    assert_eq!(note.issue_number, Some(7));
    assert_eq!(
        note.issue_url.as_deref(),
        Some("https://repo.example/issues/7")
    );
}

#[tokio::test]
async fn matcher_hit_preselects_company_and_primary_contact() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_HIT).await;
    let pipeline = pipeline_with(&pool, &backend, &[(TOKEN_AI, "sk_xyz")]).await;

    let note_id = recorded_note(&pool).await;
    pipeline.run_full_pipeline(&note_id).await.unwrap();

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    // Full pipeline stops after matching; enhancement waits for the user
    assert_eq!(note.status, NoteStatus::Transcribed);
    assert_eq!(note.selected_company_id.as_deref(), Some("acme-1"));
    // ct-1 carries the primary flag even though ct-2 is listed first
    assert_eq!(note.selected_contact_id.as_deref(), Some("ct-1"));
}

#[tokio::test]
async fn matcher_json_wrapped_in_prose_still_matches() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_HIT_IN_PROSE).await;
    let pipeline = pipeline_with(&pool, &backend, &[(TOKEN_AI, "sk_xyz")]).await;

    let note_id = recorded_note(&pool).await;
    pipeline.transcribe(&note_id).await.unwrap();

    let matched = pipeline.match_company(&note_id).await.unwrap();
    assert_eq!(matched.as_deref(), Some("acme-1"));
}

#[tokio::test]
async fn transcribe_without_audio_is_a_validation_error_without_network() {
    let (_dir, pool) = common::test_pool().await;
    // Unroutable backend: any network attempt would fail differently
    let pipeline = pipeline_with(&pool, "http://127.0.0.1:1", &[(TOKEN_AI, "sk_xyz")]).await;

    let note_id = notes::insert(&pool, Vec::new(), "audio/mpeg").await.unwrap();

    let err = pipeline.transcribe(&note_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Error);
    assert_eq!(note.error_message.as_deref(), Some("No audio recording found"));
}

#[tokio::test]
async fn transcribe_without_ai_credential_is_a_validation_error() {
    let (_dir, pool) = common::test_pool().await;
    let pipeline = pipeline_with(&pool, "http://127.0.0.1:1", &[(TOKEN_REPO, "ghp_abc")]).await;

    let note_id = recorded_note(&pool).await;
    let err = pipeline.transcribe(&note_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Error);
    assert_eq!(
        note.error_message.as_deref(),
        Some("AI API key not configured")
    );
}

#[tokio::test]
async fn submit_requires_processed_state() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let pipeline = pipeline_with(
        &pool,
        &backend,
        &[(TOKEN_AI, "sk_xyz"), (TOKEN_REPO, "ghp_abc")],
    )
    .await;

    let note_id = recorded_note(&pool).await;

    // RECORDED cannot jump to SENDING
    let err = pipeline.submit(&note_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::IllegalTransition {
            from: NoteStatus::Recorded,
            to: NoteStatus::Sending
        }
    ));
    // The illegal request left the note untouched
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Recorded);
}

#[tokio::test]
async fn vendor_failure_sets_error_and_keeps_prior_fields() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let pipeline = pipeline_with(
        &pool,
        &backend,
        &[(TOKEN_AI, "sk_xyz"), (TOKEN_REPO, "ghp_abc")],
    )
    .await;

    let note_id = recorded_note(&pool).await;
    pipeline.transcribe(&note_id).await.unwrap();
    pipeline
        .set_company_and_contact(&note_id, "acme-1", None)
        .await
        .unwrap();
    pipeline.enhance_text(&note_id, "acme-1", None).await.unwrap();

    // Point a second pipeline at a dead backend for the submit stage
    let dead = pipeline_reusing_session(&pool, "http://127.0.0.1:1").await;
    let err = dead.submit(&note_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Stage(_)));

    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Error);
    assert!(note.error_message.as_deref().unwrap().starts_with("Issue creation failed"));
    // Completed-stage outputs survive for the retry
    assert!(note.processed_text.is_some());
    assert!(note.transcription.is_some());

    // Retry resumes at submission, not from scratch
    pipeline.retry(&note_id).await.unwrap();
    let note = notes::get(&pool, &note_id).await.unwrap().unwrap();
    assert_eq!(note.status, NoteStatus::Sent);
    assert_eq!(note.issue_number, Some(7));
}

/// Second pipeline over the same storage and a live session, different
/// backend URL
async fn pipeline_reusing_session(pool: &SqlitePool, backend_url: &str) -> Pipeline {
    let vault = CredentialVault::new(pool.clone());
    let session = Arc::new(SessionManager::new(
        pool.clone(),
        vault,
        EventBus::new(64),
    ));
    session.login(PASSWORD).await.unwrap();
    Pipeline::new(
        pool.clone(),
        BackendClient::new(backend_url),
        session,
        EventBus::new(64),
    )
}
