//! Voice note persistence
//!
//! The note store exclusively owns `VoiceNote` records; the pipeline
//! borrows them by id for the duration of one stage and persists every
//! transition before the next stage reads it.

use chrono::{DateTime, Utc};
use fieldnote_common::{Error, NoteStatus, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A recorded voice note and everything the pipeline has derived from it
#[derive(Debug, Clone)]
pub struct VoiceNote {
    pub id: String,
    pub audio_data: Vec<u8>,
    pub audio_mime: String,
    pub recorded_at: DateTime<Utc>,
    pub transcription: Option<String>,
    pub processed_text: Option<String>,
    /// Conversation date extracted from the transcript (DD.MM.YYYY), which
    /// is not necessarily the recording date
    pub conversation_date: Option<String>,
    pub selected_company_id: Option<String>,
    pub selected_contact_id: Option<String>,
    pub status: NoteStatus,
    pub error_message: Option<String>,
    pub issue_url: Option<String>,
    pub issue_number: Option<i64>,
}

/// Insert a freshly recorded note in `Recorded` state, returning its id
pub async fn insert(pool: &SqlitePool, audio_data: Vec<u8>, audio_mime: &str) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let recorded_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO voice_notes (id, audio_data, audio_mime, recorded_at, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&audio_data)
    .bind(audio_mime)
    .bind(&recorded_at)
    .bind(NoteStatus::Recorded.as_str())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load a note by id
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<VoiceNote>> {
    let row = sqlx::query("SELECT * FROM voice_notes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(note_from_row).transpose()
}

/// All notes, newest first
pub async fn all(pool: &SqlitePool) -> Result<Vec<VoiceNote>> {
    let rows = sqlx::query("SELECT * FROM voice_notes ORDER BY recorded_at DESC")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Notes in a given state, oldest first (sync passes work in arrival order)
pub async fn by_status(pool: &SqlitePool, status: NoteStatus) -> Result<Vec<VoiceNote>> {
    let rows = sqlx::query("SELECT * FROM voice_notes WHERE status = ? ORDER BY recorded_at ASC")
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Update a note's status, optionally recording an error message
///
/// A non-error status clears any previous error message so a retried note
/// does not carry a stale failure.
pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    status: NoteStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let result = sqlx::query("UPDATE voice_notes SET status = ?, error_message = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("voice note {id}")));
    }
    Ok(())
}

/// Store the transcription and advance to `Transcribed`
pub async fn set_transcription(pool: &SqlitePool, id: &str, transcription: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE voice_notes
        SET transcription = ?, status = ?, error_message = NULL
        WHERE id = ?
        "#,
    )
    .bind(transcription)
    .bind(NoteStatus::Transcribed.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the user's (or the matcher's) company and contact selection
///
/// Does not touch the status: selection is orthogonal to pipeline progress.
pub async fn set_company_and_contact(
    pool: &SqlitePool,
    id: &str,
    company_id: &str,
    contact_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE voice_notes SET selected_company_id = ?, selected_contact_id = ? WHERE id = ?",
    )
    .bind(company_id)
    .bind(contact_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the enhanced text and extracted conversation date, advance to
/// `Processed`
pub async fn set_processed_text(
    pool: &SqlitePool,
    id: &str,
    processed_text: &str,
    conversation_date: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE voice_notes
        SET processed_text = ?, conversation_date = ?, status = ?, error_message = NULL
        WHERE id = ?
        "#,
    )
    .bind(processed_text)
    .bind(conversation_date)
    .bind(NoteStatus::Processed.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the filed issue reference and advance to `Sent`
pub async fn set_issue(
    pool: &SqlitePool,
    id: &str,
    issue_url: &str,
    issue_number: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE voice_notes
        SET issue_url = ?, issue_number = ?, status = ?, error_message = NULL
        WHERE id = ?
        "#,
    )
    .bind(issue_url)
    .bind(issue_number)
    .bind(NoteStatus::Sent.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a single note
pub async fn delete(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM voice_notes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every note
pub async fn delete_all(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM voice_notes").execute(pool).await?;
    Ok(())
}

fn note_from_row(row: sqlx::sqlite::SqliteRow) -> Result<VoiceNote> {
    let recorded_at: String = row.get("recorded_at");
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map_err(|e| Error::Internal(format!("Failed to parse recorded_at: {e}")))?
        .with_timezone(&Utc);

    let status: String = row.get("status");
    let status = NoteStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown note status: {status}")))?;

    Ok(VoiceNote {
        id: row.get("id"),
        audio_data: row.get("audio_data"),
        audio_mime: row.get("audio_mime"),
        recorded_at,
        transcription: row.get("transcription"),
        processed_text: row.get("processed_text"),
        conversation_date: row.get("conversation_date"),
        selected_company_id: row.get("selected_company_id"),
        selected_contact_id: row.get("selected_contact_id"),
        status,
        error_message: row.get("error_message"),
        issue_url: row.get("issue_url"),
        issue_number: row.get("issue_number"),
    })
}
