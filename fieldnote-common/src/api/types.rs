//! Request/response types for the proxy API
//!
//! The proxy interface is the only wire surface the client core knows:
//! login, AI transcription/chat, issue creation, and the company directory.
//! Third-party vendor formats stay behind the proxy; these types are the
//! contract between the two halves of the system.

use serde::{Deserialize, Serialize};

// ── Authentication ──────────────────────────────────────────────────────────

/// `POST /api/auth/login` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

/// `POST /api/auth/login` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ── AI service ──────────────────────────────────────────────────────────────

/// `POST /api/ai/transcribe` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// One message in a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// `POST /api/ai/chat` request body
///
/// `model` is optional; the proxy substitutes its configured default when
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// `POST /api/ai/chat` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Content of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

// ── Repository service ──────────────────────────────────────────────────────

/// `POST /api/repo/issues` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// `POST /api/repo/issues` response body (source-control host shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    pub id: i64,
    pub number: i64,
    pub html_url: String,
    pub created_at: String,
}

/// Contents-API response for the companies file
///
/// `content` arrives base64-encoded, possibly with embedded newlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoContentResponse {
    pub name: String,
    pub path: String,
    pub content: String,
    pub encoding: String,
}

// ── Company directory ───────────────────────────────────────────────────────

/// A contact person at a partner company
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_primary_contact: bool,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn name_with_role(&self) -> String {
        format!("{} {} ({})", self.first_name, self.last_name, self.role)
    }
}

/// A partner company from the cached directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub partnership_type: String,
    #[serde(default)]
    pub study_programs: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub last_contact_date: String,
}

impl Company {
    /// Primary contact: first flagged as primary, else the first contact
    pub fn primary_contact(&self) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.is_primary_contact)
            .or_else(|| self.contacts.first())
    }

    /// Case-insensitive match against name, short name, aliases, location
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.short_name.to_lowercase().contains(&q)
            || self.aliases.iter().any(|a| a.to_lowercase().contains(&q))
            || self.location.to_lowercase().contains(&q)
    }

    /// Matching-relevant projection sent to the AI matcher
    ///
    /// Contact details are deliberately excluded to bound request size.
    pub fn compact(&self) -> CompactCompany {
        CompactCompany {
            id: self.id.clone(),
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            aliases: self.aliases.clone(),
            location: self.location.clone(),
        }
    }
}

/// `GET /api/repo/companies` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompaniesData {
    pub companies: Vec<Company>,
}

/// Compact company record used in AI matching prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactCompany {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub aliases: Vec<String>,
    pub location: String,
}

/// AI matcher verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyMatchResult {
    pub matched_company_id: Option<String>,
    /// "high", "medium", or "low"
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub reasoning: String,
}

/// AI enhancement result: conversation date extracted separately from the
/// restructured note text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedNote {
    /// DD.MM.YYYY, or empty when the transcript names no conversation date
    #[serde(default)]
    pub conversation_date: String,
    pub processed_text: String,
}
