//! Company directory integration tests

mod common;

use std::sync::Arc;

use fieldnote_common::api::types::Company;
use fieldnote_common::EventBus;
use fieldnote_core::directory::{CompanyDirectory, DirectoryError};
use fieldnote_core::session::SessionManager;
use fieldnote_core::store::{companies, settings};
use fieldnote_core::vault::{CredentialVault, TokenSet, TOKEN_REPO};
use fieldnote_core::BackendClient;

const PASSWORD: &str = "correcthorse1";

async fn directory_with(
    pool: &sqlx::SqlitePool,
    backend_url: &str,
    logged_in: bool,
) -> CompanyDirectory {
    let vault = CredentialVault::new(pool.clone());
    let mut tokens = TokenSet::new();
    tokens.insert(TOKEN_REPO.to_string(), "ghp_abc".to_string());
    vault.setup("sam", PASSWORD, tokens).await.unwrap();

    let session = Arc::new(SessionManager::new(
        pool.clone(),
        vault,
        EventBus::new(64),
    ));
    if logged_in {
        session.login(PASSWORD).await.unwrap();
    }

    CompanyDirectory::new(
        pool.clone(),
        BackendClient::new(backend_url),
        session,
        EventBus::new(64),
    )
}

fn stale_company() -> Company {
    Company {
        id: "stale-1".into(),
        name: "Defunct Ltd".into(),
        short_name: "Defunct".into(),
        aliases: vec![],
        location: String::new(),
        partnership_type: String::new(),
        study_programs: vec![],
        contacts: vec![],
        notes: String::new(),
        last_contact_date: String::new(),
    }
}

#[tokio::test]
async fn refresh_replaces_cache_wholesale() {
    let (_dir, pool) = common::test_pool().await;
    companies::replace_all(&pool, &[stale_company()]).await.unwrap();
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let directory = directory_with(&pool, &backend, true).await;

    let count = directory.refresh().await.unwrap();
    assert_eq!(count, 1);

    // The stale entry is gone, not merged
    let cached = directory.all().await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, "acme-1");

    assert!(settings::last_companies_refresh(&pool)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn refresh_without_session_is_an_auth_error() {
    let (_dir, pool) = common::test_pool().await;
    let backend = common::spawn_stub_backend(common::MATCH_MISS).await;
    let directory = directory_with(&pool, &backend, false).await;

    assert!(matches!(
        directory.refresh().await,
        Err(DirectoryError::Auth(_))
    ));
}

#[tokio::test]
async fn initialize_offline_serves_the_cache() {
    let (_dir, pool) = common::test_pool().await;
    companies::replace_all(&pool, &[stale_company()]).await.unwrap();
    // Unroutable backend proves no network attempt happens offline
    let directory = directory_with(&pool, "http://127.0.0.1:1", true).await;

    let cached = directory.initialize(false).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, "stale-1");
}

#[tokio::test]
async fn initialize_online_with_dead_backend_falls_back_to_cache() {
    let (_dir, pool) = common::test_pool().await;
    companies::replace_all(&pool, &[stale_company()]).await.unwrap();
    let directory = directory_with(&pool, "http://127.0.0.1:1", true).await;

    let cached = directory.initialize(true).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, "stale-1");
}

#[tokio::test]
async fn search_covers_alias_and_location() {
    let (_dir, pool) = common::test_pool().await;
    common::seed_companies(&pool).await;
    let directory = directory_with(&pool, "http://127.0.0.1:1", false).await;

    assert_eq!(directory.search("corp").await.unwrap().len(), 1);
    assert_eq!(directory.search("wetzlar").await.unwrap().len(), 1);
    assert_eq!(directory.search("zzz").await.unwrap().len(), 0);
    // Blank query returns everything
    assert_eq!(directory.search("  ").await.unwrap().len(), 1);
}
