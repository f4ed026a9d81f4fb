//! HTTP client for the proxy backend
//!
//! Wraps the proxy interface the pipeline talks to: login, transcription,
//! chat, issue creation, and the company directory. Third-party vendor
//! formats never appear here; the proxy owns those.

use reqwest::multipart;
use thiserror::Error;

use fieldnote_common::api::types::{
    ChatRequest, ChatResponse, CompaniesData, IssueRequest, IssueResponse, LoginRequest,
    LoginResponse, TranscriptionResponse,
};

/// Client-side failures, split so callers can distinguish auth problems
/// from vendor/network ones
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (offline, DNS, timeout)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Bearer token rejected by the proxy
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Non-2xx response other than 401
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 2xx response whose body did not match the contract
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Thin typed wrapper over the proxy API
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/auth/login`, the alternative (non-local-first) auth mode
    pub async fn login(
        &self,
        user_name: &str,
        password: &str,
    ) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&LoginRequest {
                user_name: user_name.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        // Login deliberately returns its body on 401 too
        let status = response.status();
        if status.is_success() || status.as_u16() == 401 {
            Ok(response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// `POST /api/ai/transcribe`: multipart audio upload
    pub async fn transcribe(
        &self,
        bearer: &str,
        audio: Vec<u8>,
        mime: &str,
        file_name: &str,
    ) -> Result<String, ClientError> {
        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| ClientError::InvalidResponse(format!("bad audio mime: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/ai/transcribe", self.base_url))
            .bearer_auth(bearer)
            .multipart(form)
            .send()
            .await?;

        let body: TranscriptionResponse = expect_json(response).await?;
        Ok(body.text)
    }

    /// `POST /api/ai/chat`: returns the first choice's content
    pub async fn chat(&self, bearer: &str, request: &ChatRequest) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/ai/chat", self.base_url))
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        let body: ChatResponse = expect_json(response).await?;
        body.first_content()
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("chat response had no choices".into()))
    }

    /// `POST /api/repo/issues`
    pub async fn create_issue(
        &self,
        bearer: &str,
        request: &IssueRequest,
    ) -> Result<IssueResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/repo/issues", self.base_url))
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        expect_json(response).await
    }

    /// `GET /api/repo/companies`
    pub async fn fetch_companies(&self, bearer: &str) -> Result<CompaniesData, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/repo/companies", self.base_url))
            .bearer_auth(bearer)
            .send()
            .await?;

        expect_json(response).await
    }

    /// Cheap token validity probe: a directory fetch that succeeds means
    /// the credential can read the repository
    pub async fn validate_repo_access(&self, bearer: &str) -> bool {
        self.fetch_companies(bearer).await.is_ok()
    }
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let message = match response.text().await {
        Ok(body) if !body.is_empty() => {
            // Prefer the proxy's {"error": "..."} shape, fall back to raw
            serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(body)
        }
        _ => "request failed".to_string(),
    };

    if status == 401 {
        ClientError::Unauthorized(message)
    } else {
        ClientError::Api { status, message }
    }
}
