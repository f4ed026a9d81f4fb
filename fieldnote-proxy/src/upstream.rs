//! Upstream clients for the AI vendor and the source-control host
//!
//! The handlers stay thin; these clients own URLs, auth headers, and the
//! vendor response shapes that never leave the proxy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::multipart;
use serde::de::DeserializeOwned;

use fieldnote_common::api::types::{
    ChatRequest, ChatResponse, CompaniesData, IssueRequest, IssueResponse, RepoContentResponse,
    TranscriptionResponse,
};

use crate::config::{AiConfig, RepoConfig};
use crate::error::ApiError;

const USER_AGENT: &str = concat!("fieldnote-proxy/", env!("CARGO_PKG_VERSION"));

/// AI vendor client (transcription + chat completions)
#[derive(Clone)]
pub struct AiUpstream {
    http: reqwest::Client,
    config: AiConfig,
}

impl AiUpstream {
    pub fn new(http: reqwest::Client, config: AiConfig) -> Self {
        Self { http, config }
    }

    /// Forward an audio payload to the vendor transcription endpoint
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        mime: String,
    ) -> Result<TranscriptionResponse, ApiError> {
        let part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(&mime)
            .map_err(|e| ApiError::BadRequest(format!("Unsupported audio type: {e}")))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone())
            .text("language", self.config.language.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;

        read_upstream_json(response).await
    }

    /// Forward a chat request, substituting the configured default model
    /// when the caller named none
    pub async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse, ApiError> {
        if request.model.is_none() {
            request.model = Some(self.config.chat_model.clone());
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;

        read_upstream_json(response).await
    }
}

/// Source-control host client (issues + companies file)
#[derive(Clone)]
pub struct RepoUpstream {
    http: reqwest::Client,
    config: RepoConfig,
}

impl RepoUpstream {
    pub fn new(http: reqwest::Client, config: RepoConfig) -> Self {
        Self { http, config }
    }

    /// Create an issue in the configured repository
    pub async fn create_issue(&self, request: &IssueRequest) -> Result<IssueResponse, ApiError> {
        let response = self
            .http
            .post(format!(
                "{}/repos/{}/{}/issues",
                self.config.base_url, self.config.owner, self.config.name
            ))
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;

        read_upstream_json(response).await
    }

    /// Fetch and decode the companies file from the repository contents API
    pub async fn fetch_companies(&self) -> Result<CompaniesData, ApiError> {
        let response = self
            .http
            .get(format!(
                "{}/repos/{}/{}/contents/{}",
                self.config.base_url, self.config.owner, self.config.name,
                self.config.companies_path
            ))
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;

        let content: RepoContentResponse = read_upstream_json(response).await?;

        // The contents API base64-encodes the payload with embedded newlines
        let packed: String = content.content.chars().filter(|c| *c != '\n').collect();
        let decoded = BASE64
            .decode(packed.as_bytes())
            .map_err(|e| ApiError::Internal(format!("Companies file not base64: {e}")))?;

        serde_json::from_slice(&decoded)
            .map_err(|e| ApiError::Internal(format!("Companies file not valid JSON: {e}")))
    }
}

/// Parse an upstream response, passing non-2xx statuses through
async fn read_upstream_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .ok()
            .filter(|b| !b.is_empty())
            .and_then(|body| {
                serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("message")
                            .or_else(|| v.get("error"))
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                    })
                    .or(Some(body))
            })
            .unwrap_or_else(|| "upstream request failed".to_string());
        return Err(ApiError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("Unexpected upstream response: {e}")))
}
