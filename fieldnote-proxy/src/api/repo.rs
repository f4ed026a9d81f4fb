//! Repository proxy routes: issue creation and the company directory

use axum::{extract::State, Extension, Json};
use tracing::info;

use fieldnote_common::api::auth::TokenClaims;
use fieldnote_common::api::types::{CompaniesData, IssueRequest, IssueResponse};

use crate::error::ApiError;
use crate::AppState;

/// `POST /api/repo/issues`
pub async fn create_issue(
    State(state): State<AppState>,
    Extension(claims): Extension<TokenClaims>,
    Json(mut request): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, ApiError> {
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and body are required".to_string(),
        ));
    }

    if request.labels.is_empty() {
        request.labels = vec!["partner-contact".to_string()];
    }

    let issue = state.repo.create_issue(&request).await?;
    info!("Issue #{} created by {}", issue.number, claims.sub);
    Ok(Json(issue))
}

/// `GET /api/repo/companies`
pub async fn companies(
    State(state): State<AppState>,
) -> Result<Json<CompaniesData>, ApiError> {
    let data = state.repo.fetch_companies().await?;
    info!("Served company directory ({} entries)", data.companies.len());
    Ok(Json(data))
}
