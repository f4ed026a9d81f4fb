//! Per-note processing pipeline
//!
//! Drives one voice note through transcribe → match company → enhance →
//! submit, persisting every state transition before the next stage reads
//! it. Stages are strictly sequential per note; failures set the note's
//! `Error` state with a human-readable message and never escape past the
//! pipeline boundary as panics.
//!
//! Enhancement and submission are never auto-triggered from a fresh
//! recording: [`Pipeline::run_full_pipeline`] stops after company matching
//! so a misidentified company cannot silently receive a filed note.

use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use fieldnote_common::api::types::{Company, IssueRequest, IssueResponse};
use fieldnote_common::{time, AppEvent, EventBus, NoteStatus};

use crate::assist;
use crate::client::BackendClient;
use crate::session::{SessionError, SessionManager};
use crate::store::{companies, notes};
use crate::vault::{TOKEN_AI, TOKEN_REPO};

/// Pipeline failures
///
/// `Auth` surfaces before any note mutation so the caller can prompt for
/// the password; everything else is recorded on the note itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("note not found: {0}")]
    NotFound(String),

    /// Input validation failed before any external call; the note is in
    /// `Error` state with the same message
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transition would skip a required predecessor state
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: NoteStatus, to: NoteStatus },

    /// Session could not produce the required token (locked, logged out)
    #[error(transparent)]
    Auth(SessionError),

    /// A vendor/network call failed; the note is in `Error` state and
    /// eligible for a later sync-pass retry
    #[error("stage failed: {0}")]
    Stage(String),

    #[error("storage error: {0}")]
    Storage(#[from] fieldnote_common::Error),
}

/// Orchestrates pipeline stages for individual notes
pub struct Pipeline {
    pool: SqlitePool,
    client: BackendClient,
    session: Arc<SessionManager>,
    events: EventBus,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        client: BackendClient,
        session: Arc<SessionManager>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            client,
            session,
            events,
        }
    }

    /// Transcribe a note's audio
    ///
    /// Requires a non-empty audio payload and a configured AI credential,
    /// both checked before any network call. Success stores the
    /// transcription and advances to `Transcribed`.
    pub async fn transcribe(&self, note_id: &str) -> Result<(), PipelineError> {
        let note = self.load(note_id).await?;
        self.require_legal(&note, NoteStatus::Transcribing)?;

        if note.audio_data.is_empty() {
            return self.fail_validation(&note, "No audio recording found").await;
        }

        let bearer = match self.session.token(TOKEN_AI).await {
            Ok(token) => token,
            Err(SessionError::MissingToken(_)) => {
                return self.fail_validation(&note, "AI API key not configured").await;
            }
            Err(e) => return Err(PipelineError::Auth(e)),
        };

        self.set_status(&note.id, note.status, NoteStatus::Transcribing, None)
            .await?;

        match self
            .client
            .transcribe(&bearer, note.audio_data.clone(), &note.audio_mime, "audio.mp3")
            .await
        {
            Ok(text) => {
                notes::set_transcription(&self.pool, &note.id, &text).await?;
                self.emit_change(&note.id, NoteStatus::Transcribing, NoteStatus::Transcribed);
                info!("Note {} transcribed ({} chars)", note.id, text.len());
                Ok(())
            }
            Err(e) => {
                self.fail_stage(&note.id, NoteStatus::Transcribing, "Transcription failed", e)
                    .await
            }
        }
    }

    /// Best-effort company matching against the cached directory
    ///
    /// A confident match pre-selects the company and its primary contact.
    /// Matching failures are non-fatal: the status is left unchanged and
    /// the user selects manually.
    pub async fn match_company(&self, note_id: &str) -> Result<Option<String>, PipelineError> {
        let note = self.load(note_id).await?;

        let Some(transcription) = note.transcription.as_deref() else {
            return Err(PipelineError::Validation(
                "No transcription to match against".to_string(),
            ));
        };

        let bearer = self
            .session
            .token(TOKEN_AI)
            .await
            .map_err(PipelineError::Auth)?;

        let directory = companies::all(&self.pool).await?;
        if directory.is_empty() {
            return Ok(None);
        }
        let compact: Vec<_> = directory.iter().map(Company::compact).collect();

        let request = assist::company_match_request(transcription, &compact, None);
        let content = match self.client.chat(&bearer, &request).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Company matching call failed for note {}: {e}", note.id);
                return Ok(None);
            }
        };

        let result = match assist::parse_match_result(&content) {
            Ok(result) => result,
            Err(e) => {
                warn!("Company matching response unparseable for note {}: {e}", note.id);
                return Ok(None);
            }
        };

        let Some(company_id) = result.matched_company_id else {
            info!("No company match for note {} ({})", note.id, result.reasoning);
            return Ok(None);
        };

        let Some(company) = companies::get(&self.pool, &company_id).await? else {
            warn!("Matcher returned unknown company id {company_id}");
            return Ok(None);
        };

        let contact_id = company.primary_contact().map(|c| c.id.clone());
        notes::set_company_and_contact(&self.pool, &note.id, &company.id, contact_id.as_deref())
            .await?;

        info!(
            "Note {} matched to company {} (confidence: {})",
            note.id, company.name, result.confidence
        );
        Ok(Some(company.id))
    }

    /// Manual company/contact selection
    pub async fn set_company_and_contact(
        &self,
        note_id: &str,
        company_id: &str,
        contact_id: Option<&str>,
    ) -> Result<(), PipelineError> {
        let note = self.load(note_id).await?;
        if companies::get(&self.pool, company_id).await?.is_none() {
            return Err(PipelineError::Validation(format!(
                "Unknown company: {company_id}"
            )));
        }
        notes::set_company_and_contact(&self.pool, &note.id, company_id, contact_id).await?;
        Ok(())
    }

    /// Enhance the transcription into a structured write-up
    ///
    /// Requires a transcription and a resolved company (explicitly passed:
    /// this stage only runs after user confirmation). Advances to
    /// `Processed` with the extracted conversation date on success.
    pub async fn enhance_text(
        &self,
        note_id: &str,
        company_id: &str,
        contact_id: Option<&str>,
    ) -> Result<(), PipelineError> {
        let note = self.load(note_id).await?;
        self.require_legal(&note, NoteStatus::Processing)?;

        let Some(transcription) = note.transcription.clone() else {
            return self.fail_validation(&note, "No transcription found").await;
        };

        let Some(company) = companies::get(&self.pool, company_id).await? else {
            return self.fail_validation(&note, "Company not found").await;
        };

        let bearer = match self.session.token(TOKEN_AI).await {
            Ok(token) => token,
            Err(SessionError::MissingToken(_)) => {
                return self.fail_validation(&note, "AI API key not configured").await;
            }
            Err(e) => return Err(PipelineError::Auth(e)),
        };

        let contact = match contact_id {
            Some(id) => company.contacts.iter().find(|c| c.id == id).cloned(),
            None => company.primary_contact().cloned(),
        };
        let contact_name = contact
            .as_ref()
            .map(|c| c.name_with_role())
            .unwrap_or_else(|| "Not specified".to_string());
        let author = self
            .session
            .user_name()
            .await
            .unwrap_or_else(|| "Unknown".to_string());

        // Persist the confirmed selection before the slow call so a crash
        // mid-stage keeps the user's choice
        notes::set_company_and_contact(
            &self.pool,
            &note.id,
            &company.id,
            contact.as_ref().map(|c| c.id.as_str()),
        )
        .await?;

        self.set_status(&note.id, note.status, NoteStatus::Processing, None)
            .await?;

        let request =
            assist::enhance_request(&transcription, &company.name, &contact_name, &author, None);

        let content = match self.client.chat(&bearer, &request).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .fail_stage(&note.id, NoteStatus::Processing, "Text enhancement failed", e)
                    .await;
            }
        };

        match assist::parse_enhanced_note(&content) {
            Ok(enhanced) => {
                let conversation_date = if enhanced.conversation_date.trim().is_empty() {
                    None
                } else {
                    Some(enhanced.conversation_date.as_str())
                };
                notes::set_processed_text(
                    &self.pool,
                    &note.id,
                    &enhanced.processed_text,
                    conversation_date,
                )
                .await?;
                self.emit_change(&note.id, NoteStatus::Processing, NoteStatus::Processed);
                info!("Note {} enhanced", note.id);
                Ok(())
            }
            Err(e) => {
                self.fail_stage(&note.id, NoteStatus::Processing, "Text enhancement failed", e)
                    .await
            }
        }
    }

    /// File the processed note as an issue
    ///
    /// Requires processed text, a resolved company, and a source-control
    /// token. Records the remote issue reference and advances to `Sent`.
    pub async fn submit(&self, note_id: &str) -> Result<IssueResponse, PipelineError> {
        let note = self.load(note_id).await?;
        self.require_legal(&note, NoteStatus::Sending)?;

        let (Some(processed_text), Some(company_id)) =
            (note.processed_text.clone(), note.selected_company_id.clone())
        else {
            return self.fail_validation(&note, "Note not fully processed").await;
        };

        let Some(company) = companies::get(&self.pool, &company_id).await? else {
            return self.fail_validation(&note, "Company not found").await;
        };

        let bearer = match self.session.token(TOKEN_REPO).await {
            Ok(token) => token,
            Err(SessionError::MissingToken(_)) => {
                return self
                    .fail_validation(&note, "Source-control token not configured")
                    .await;
            }
            Err(e) => return Err(PipelineError::Auth(e)),
        };

        let author = self
            .session
            .user_name()
            .await
            .unwrap_or_else(|| "Unknown".to_string());
        let date = time::format_date_dmy(note.recorded_at);

        let short = if company.short_name.is_empty() {
            company.name.clone()
        } else {
            company.short_name.clone()
        };
        let title = format!("[{short}] - {date} - {author}");
        let body = format_issue_body(&processed_text, &company);
        let labels = vec!["partner-contact".to_string(), label_slug(&short)];

        self.set_status(&note.id, note.status, NoteStatus::Sending, None)
            .await?;

        match self
            .client
            .create_issue(
                &bearer,
                &IssueRequest {
                    title,
                    body,
                    labels,
                },
            )
            .await
        {
            Ok(issue) => {
                notes::set_issue(&self.pool, &note.id, &issue.html_url, issue.number).await?;
                self.emit_change(&note.id, NoteStatus::Sending, NoteStatus::Sent);
                info!("Note {} filed as issue #{}", note.id, issue.number);
                Ok(issue)
            }
            Err(e) => {
                self.fail_stage::<IssueResponse>(
                    &note.id,
                    NoteStatus::Sending,
                    "Issue creation failed",
                    e,
                )
                .await
            }
        }
    }

    /// Transcribe then match, and stop
    ///
    /// Enhancement and submission require explicit user confirmation of
    /// the company and contact and are never chained from here.
    pub async fn run_full_pipeline(&self, note_id: &str) -> Result<(), PipelineError> {
        self.transcribe(note_id).await?;
        let _ = self.match_company(note_id).await?;
        Ok(())
    }

    /// Resume a note from its last successful stage
    ///
    /// Dispatches on the fields already present rather than on the `Error`
    /// marker, so retries never redo completed work.
    pub async fn retry(&self, note_id: &str) -> Result<(), PipelineError> {
        let note = self.load(note_id).await?;

        if note.status == NoteStatus::Sent {
            return Ok(());
        }

        if note.transcription.is_none() {
            return self.run_full_pipeline(note_id).await;
        }
        if note.processed_text.is_none() {
            let Some(company_id) = note.selected_company_id.clone() else {
                return Err(PipelineError::Validation(
                    "Company must be selected before retrying enhancement".to_string(),
                ));
            };
            return self
                .enhance_text(note_id, &company_id, note.selected_contact_id.as_deref())
                .await;
        }
        self.submit(note_id).await.map(|_| ())
    }

    // ── internals ───────────────────────────────────────────────────────

    async fn load(&self, note_id: &str) -> Result<notes::VoiceNote, PipelineError> {
        notes::get(&self.pool, note_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(note_id.to_string()))
    }

    fn require_legal(
        &self,
        note: &notes::VoiceNote,
        to: NoteStatus,
    ) -> Result<(), PipelineError> {
        if note.status.can_advance_to(to) {
            Ok(())
        } else {
            Err(PipelineError::IllegalTransition {
                from: note.status,
                to,
            })
        }
    }

    async fn set_status(
        &self,
        note_id: &str,
        old: NoteStatus,
        new: NoteStatus,
        error_message: Option<&str>,
    ) -> Result<(), PipelineError> {
        notes::update_status(&self.pool, note_id, new, error_message).await?;
        self.emit_change(note_id, old, new);
        Ok(())
    }

    /// Record a pre-network validation failure on the note
    async fn fail_validation<T>(
        &self,
        note: &notes::VoiceNote,
        message: &str,
    ) -> Result<T, PipelineError> {
        notes::update_status(&self.pool, &note.id, NoteStatus::Error, Some(message)).await?;
        self.emit_change(&note.id, note.status, NoteStatus::Error);
        Err(PipelineError::Validation(message.to_string()))
    }

    /// Record a stage failure, keeping prior fields intact
    async fn fail_stage<T>(
        &self,
        note_id: &str,
        from: NoteStatus,
        context: &str,
        error: impl std::fmt::Display,
    ) -> Result<T, PipelineError> {
        let message = format!("{context}: {error}");
        warn!("Note {note_id}: {message}");
        notes::update_status(&self.pool, note_id, NoteStatus::Error, Some(&message)).await?;
        self.emit_change(note_id, from, NoteStatus::Error);
        Err(PipelineError::Stage(message))
    }

    fn emit_change(&self, note_id: &str, old: NoteStatus, new: NoteStatus) {
        self.events.emit_lossy(AppEvent::NoteStatusChanged {
            note_id: note_id.to_string(),
            old_status: old,
            new_status: new,
            timestamp: time::now(),
        });
    }
}

/// Issue body: the processed text plus a metadata footer
fn format_issue_body(processed_text: &str, company: &Company) -> String {
    let programs = if company.study_programs.is_empty() {
        "Not specified".to_string()
    } else {
        company.study_programs.join(", ")
    };
    format!(
        "{processed_text}\n\n## Metadata\n- Created: {}\n- Study programs: {programs}",
        time::now().to_rfc3339()
    )
}

/// Lowercased, dash-separated label form of a company short name
fn label_slug(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_slug_collapses_whitespace() {
        assert_eq!(label_slug("Acme Corp"), "acme-corp");
        assert_eq!(label_slug("  Spaced   Out  "), "spaced-out");
        assert_eq!(label_slug("Single"), "single");
    }

    #[test]
    fn issue_body_appends_metadata_footer() {
        let company = Company {
            id: "c1".into(),
            name: "Acme".into(),
            short_name: "Acme".into(),
            aliases: vec![],
            location: String::new(),
            partnership_type: String::new(),
            study_programs: vec!["Engineering".into(), "Business".into()],
            contacts: vec![],
            notes: String::new(),
            last_contact_date: String::new(),
        };
        let body = format_issue_body("## Meeting Notes\ncontent", &company);
        assert!(body.starts_with("## Meeting Notes"));
        assert!(body.contains("## Metadata"));
        assert!(body.contains("Engineering, Business"));
    }
}
