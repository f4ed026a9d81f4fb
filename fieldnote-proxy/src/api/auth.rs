//! Login endpoint and bearer-token middleware

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use fieldnote_common::api::auth::{validate_token, TokenError};
use fieldnote_common::api::types::{LoginRequest, LoginResponse};

use crate::error::ApiError;
use crate::users::{find_user, verify_password};
use crate::AppState;

/// `POST /api/auth/login`
///
/// Validates credentials against the user registry and mints a signed
/// bearer token. Wrong credentials get a 401 with a `success: false` body
/// (the client renders the message); missing fields are a 400.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if request.user_name.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    let rejected = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                token: None,
                display_name: None,
                message: Some("Invalid credentials".to_string()),
            }),
        )
            .into_response()
    };

    let Some(user) = find_user(&state.users, &request.user_name) else {
        warn!("Login attempt for unknown user {}", request.user_name);
        return Ok(rejected());
    };

    // Verification is CPU-bound PBKDF2; keep it off the reactor
    let password = request.password.clone();
    let stored = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))?;

    if !valid {
        warn!("Failed login for {}", request.user_name);
        return Ok(rejected());
    }

    let token = fieldnote_common::api::auth::mint_token(
        &user.user_name,
        &user.display_name,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    );

    info!("User {} logged in", user.user_name);
    Ok(Json(LoginResponse {
        success: true,
        token: Some(token),
        display_name: Some(user.display_name.clone()),
        message: None,
    })
    .into_response())
}

/// Bearer-token middleware for all protected `/api` routes
///
/// On success the validated claims are attached to the request for
/// handlers that want the caller's name.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".to_string()))?;

    let claims = validate_token(token, &state.config.jwt_secret).map_err(|e| match e {
        TokenError::Expired => ApiError::Unauthorized("Token expired".to_string()),
        _ => ApiError::Unauthorized("Invalid token".to_string()),
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
