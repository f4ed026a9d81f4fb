//! AI proxy routes: transcription and chat completions

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::info;

use fieldnote_common::api::types::{ChatRequest, ChatResponse, TranscriptionResponse};

use crate::error::ApiError;
use crate::AppState;

/// `POST /api/ai/transcribe`
///
/// Expects multipart/form-data with a `file` field carrying the audio
/// payload. Validated before any upstream call.
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let mut audio: Option<(Vec<u8>, String, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("audio.mp3").to_string();
            let mime = field
                .content_type()
                .unwrap_or("audio/mpeg")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read audio field: {e}")))?;
            audio = Some((bytes.to_vec(), file_name, mime));
        }
    }

    let Some((bytes, file_name, mime)) = audio else {
        return Err(ApiError::BadRequest("No audio file provided".to_string()));
    };
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Audio file is empty".to_string()));
    }

    info!("Transcribing {} bytes ({mime})", bytes.len());
    let result = state.ai.transcribe(bytes, file_name, mime).await?;
    Ok(Json(result))
}

/// `POST /api/ai/chat`
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("Messages are required".to_string()));
    }

    let response = state.ai.chat(request).await?;
    Ok(Json(response))
}
