//! Account endpoints: signup, activation, profiles, credentials and the
//! admin state transitions.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{RequestContext, ensure_owner_or_admin};
use super::validation::validate_limit;
use super::{AccountDto, AccountMessage, ApiError, ApiResponse, AppState, LimitQuery, MessageResponse};
use crate::services::{PasswordChange, Registration};

const FORGOT_PASSWORD_NOTICE: &str =
    "If that address belongs to an account, a password reset link is on its way";

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirmation: String,
}

type AccountResponse = Json<ApiResponse<AccountDto>>;
type NoticeResponse = Json<ApiResponse<MessageResponse>>;

/// POST /users
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, AccountResponse), ApiError> {
    let account = state.account_service().register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AccountDto::private(&account))),
    ))
}

/// GET /users/activate?code=...
pub async fn activate_from_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivateQuery>,
) -> Result<Json<ApiResponse<AccountMessage>>, ApiError> {
    activation_response(&state, query.code.as_deref()).await
}

/// GET /users/activate/{code}
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<AccountMessage>>, ApiError> {
    activation_response(&state, Some(&code)).await
}

async fn activation_response(
    state: &AppState,
    code: Option<&str>,
) -> Result<Json<ApiResponse<AccountMessage>>, ApiError> {
    let account = state.account_service().activate(code).await?;

    Ok(Json(ApiResponse::success(AccountMessage {
        message: "Signup complete! You may now log in to your account.".to_string(),
        account: AccountDto::private(&account),
    })))
}

/// GET /users
/// Newest activated members
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<AccountDto>>>, ApiError> {
    let limit = query.limit.map(validate_limit).transpose()?;
    let accounts = state.account_service().latest_members(limit).await?;

    Ok(Json(ApiResponse::success(
        accounts.iter().map(AccountDto::public).collect(),
    )))
}

/// GET /users/{permalink}
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
) -> Result<AccountResponse, ApiError> {
    let account = state
        .account_service()
        .show_profile(&permalink, ctx.account_id())
        .await?;

    Ok(Json(ApiResponse::success(AccountDto::for_viewer(
        &account,
        ctx.account.as_ref(),
    ))))
}

/// GET /me
pub async fn hub(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<AccountResponse, ApiError> {
    let viewer = ctx.require()?;
    let account = state.account_service().hub(viewer.id).await?;

    Ok(Json(ApiResponse::success(AccountDto::private(&account))))
}

/// PUT /users/{permalink}/change_password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    session: Session,
    Path(permalink): Path<String>,
    Json(change): Json<PasswordChange>,
) -> Result<NoticeResponse, ApiError> {
    let viewer = ctx.require()?;
    let target = state.account_service().find_by_permalink(&permalink).await?;
    ensure_owner_or_admin(viewer, &target)?;

    state
        .account_service()
        .change_password(target.id, change)
        .await?;

    if viewer.id == target.id {
        session
            .cycle_id()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Your password has been changed.",
    ))))
}

/// PUT /users/{permalink}/change_email
pub async fn change_email(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
    Json(payload): Json<EmailRequest>,
) -> Result<NoticeResponse, ApiError> {
    let viewer = ctx.require()?;
    let target = state.account_service().find_by_permalink(&permalink).await?;
    ensure_owner_or_admin(viewer, &target)?;

    state
        .account_service()
        .change_email(target.id, &payload.email)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "A confirmation link has been sent to the new address.",
    ))))
}

/// GET /users/activate_new_email/{code}
pub async fn confirm_email(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<AccountMessage>>, ApiError> {
    let account = state.account_service().confirm_email_change(&code).await?;

    Ok(Json(ApiResponse::success(AccountMessage {
        message: "The email address for your account has been updated.".to_string(),
        account: AccountDto::private(&account),
    })))
}

/// POST /users/forgot_password
///
/// Answers the same way whether or not the address is known.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EmailRequest>,
) -> Result<NoticeResponse, ApiError> {
    state.account_service().forgot_password(&payload.email).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        FORGOT_PASSWORD_NOTICE,
    ))))
}

/// GET /users/reset_password/{code}
pub async fn check_reset_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<NoticeResponse, ApiError> {
    state.account_service().check_reset_code(&code).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Please choose a new password.",
    ))))
}

/// POST /users/reset_password/{code}
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<NoticeResponse, ApiError> {
    state
        .account_service()
        .reset_password(&code, &payload.password, &payload.password_confirmation)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password reset. You may now log in with your new password.",
    ))))
}

// ============================================================================
// Admin
// ============================================================================

/// PUT /users/{permalink}/suspend
pub async fn suspend(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
) -> Result<AccountResponse, ApiError> {
    let admin = ctx.require()?;
    let target = state.account_service().find_by_permalink(&permalink).await?;
    if target.id == admin.id {
        return Err(ApiError::validation("You cannot suspend yourself"));
    }

    let account = state.account_service().suspend(target.id, admin.id).await?;
    Ok(Json(ApiResponse::success(AccountDto::private(&account))))
}

/// PUT /users/{permalink}/unsuspend
pub async fn unsuspend(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
) -> Result<AccountResponse, ApiError> {
    let admin = ctx.require()?;
    let target = state.account_service().find_by_permalink(&permalink).await?;

    let account = state
        .account_service()
        .unsuspend(target.id, admin.id)
        .await?;
    Ok(Json(ApiResponse::success(AccountDto::private(&account))))
}

/// DELETE /users/{permalink}
/// Soft delete; the row stays until purged.
pub async fn soft_delete(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
) -> Result<AccountResponse, ApiError> {
    let admin = ctx.require()?;
    let target = state.account_service().find_by_permalink(&permalink).await?;
    if target.id == admin.id {
        return Err(ApiError::validation("You cannot delete yourself"));
    }

    let account = state
        .account_service()
        .soft_delete(target.id, admin.id)
        .await?;
    Ok(Json(ApiResponse::success(AccountDto::private(&account))))
}

/// DELETE /users/{permalink}/purge
pub async fn purge(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(permalink): Path<String>,
) -> Result<NoticeResponse, ApiError> {
    let admin = ctx.require()?;
    let target = state
        .account_service()
        .find_any_by_permalink(&permalink)
        .await?;
    if target.id == admin.id {
        return Err(ApiError::validation("You cannot purge yourself"));
    }

    state.account_service().purge(target.id, admin.id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "User '{}' has been purged.",
        target.login
    )))))
}
