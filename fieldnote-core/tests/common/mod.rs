//! Shared fixtures for fieldnote-core integration tests
#![allow(dead_code)] // not every test binary uses every fixture

use axum::extract::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use fieldnote_common::api::types::{Company, Contact};
use fieldnote_core::store::companies;

/// Fresh scratch database; keep the TempDir alive for the test's duration
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = fieldnote_common::db::init_database(&dir.path().join("test.db"))
        .await
        .unwrap();
    (dir, pool)
}

/// One-company directory with a primary and a secondary contact
pub fn acme() -> Company {
    Company {
        id: "acme-1".into(),
        name: "Acme Manufacturing GmbH".into(),
        short_name: "Acme".into(),
        aliases: vec!["Acme Corp".into()],
        location: "Wetzlar".into(),
        partnership_type: "premium".into(),
        study_programs: vec!["Engineering".into()],
        contacts: vec![
            Contact {
                id: "ct-2".into(),
                first_name: "Udo".into(),
                last_name: "Klein".into(),
                role: "CTO".into(),
                email: String::new(),
                phone: String::new(),
                is_primary_contact: false,
            },
            Contact {
                id: "ct-1".into(),
                first_name: "Jana".into(),
                last_name: "Berg".into(),
                role: "HR".into(),
                email: String::new(),
                phone: String::new(),
                is_primary_contact: true,
            },
        ],
        notes: String::new(),
        last_contact_date: String::new(),
    }
}

pub async fn seed_companies(pool: &SqlitePool) {
    companies::replace_all(pool, &[acme()]).await.unwrap();
}

/// Directory payload served by the stub's companies route
pub fn directory_payload() -> fieldnote_common::api::types::CompaniesData {
    fieldnote_common::api::types::CompaniesData {
        companies: vec![acme()],
    }
}

/// Stub proxy backend
///
/// - `/api/ai/transcribe` returns a fixed transcript
/// - `/api/ai/chat` answers matching requests with `match_reply` and
///   enhancement requests with a canned structured result
/// - `/api/repo/issues` returns issue #7
///
/// `match_reply` lets tests pick between a hit, a miss, and prose-wrapped
/// JSON.
pub async fn spawn_stub_backend(match_reply: &'static str) -> String {
    let chat = move |Json(body): Json<Value>| async move {
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let content = if prompt.contains("matched_company_id") {
            match_reply.to_string()
        } else {
            json!({
                "conversationDate": "05.03.2025",
                "processedText": "## Meeting Notes\nDiscussed intern program."
            })
            .to_string()
        };
        Json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    };

    let app = Router::new()
        .route(
            "/api/ai/transcribe",
            post(|| async { Json(json!({"text": "Met with Acme in Wetzlar about interns"})) }),
        )
        .route("/api/ai/chat", post(chat))
        .route(
            "/api/repo/issues",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "id": 1001,
                    "number": 7,
                    "html_url": "https://repo.example/issues/7",
                    "created_at": "2025-03-07T10:00:00Z",
                    "title": body["title"],
                }))
            }),
        )
        .route(
            "/api/repo/companies",
            get(|| async { Json(serde_json::to_value(directory_payload()).unwrap()) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Matcher reply that names the seeded company
pub const MATCH_HIT: &str =
    r#"{"matched_company_id": "acme-1", "confidence": "high", "reasoning": "name match"}"#;

/// Matcher reply with no match
pub const MATCH_MISS: &str =
    r#"{"matched_company_id": null, "confidence": "low", "reasoning": "no company mentioned"}"#;

/// Matcher reply wrapped in prose (exercises the tolerant parser)
pub const MATCH_HIT_IN_PROSE: &str = "Certainly! Based on the note I believe this is it:\n\n{\"matched_company_id\": \"acme-1\", \"confidence\": \"medium\", \"reasoning\": \"location match\"}\n\nHope that helps!";
