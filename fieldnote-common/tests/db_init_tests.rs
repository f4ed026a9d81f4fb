//! Integration tests for database initialization

use fieldnote_common::db::init_database;

#[tokio::test]
async fn init_creates_database_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldnote.db");
    assert!(!db_path.exists());

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    // All tables queryable
    for table in [
        "user_credentials",
        "auth_sessions",
        "webauthn_credentials",
        "voice_notes",
        "companies",
        "settings",
    ] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0, "table {table} should exist and be empty");
    }
}

#[tokio::test]
async fn init_is_idempotent_on_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldnote.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO settings (key, value) VALUES ('auto_lock_minutes', '5')")
        .execute(&pool)
        .await
        .unwrap();
    drop(pool);

    // Reopen: schema creation must not clobber existing rows
    let pool = init_database(&db_path).await.unwrap();
    let value: (String,) =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'auto_lock_minutes'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.0, "5");
}

#[tokio::test]
async fn init_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("deeper").join("fieldnote.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());
    drop(pool);
}
