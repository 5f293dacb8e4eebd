use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::RequestContext;
use super::{AccountDto, ApiError, ApiResponse, AppState, ForumDto, MessageResponse};
use crate::domain::ForumId;
use crate::services::NewForum;

#[derive(Debug, Serialize)]
pub struct ModerationCheck {
    pub forum: String,
    pub account: String,
    pub moderator: bool,
}

/// GET /forums
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ForumDto>>>, ApiError> {
    let forums = state.forum_service().list().await?;
    Ok(Json(ApiResponse::success(
        forums.into_iter().map(ForumDto::from).collect(),
    )))
}

/// POST /forums
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(forum): Json<NewForum>,
) -> Result<(StatusCode, Json<ApiResponse<ForumDto>>), ApiError> {
    let admin = ctx.require()?;
    let forum = state.forum_service().create(forum, admin.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ForumDto::from(forum))),
    ))
}

/// GET /forums/{forum}/moderators
pub async fn moderators(
    State(state): State<Arc<AppState>>,
    Path(forum): Path<String>,
) -> Result<Json<ApiResponse<Vec<AccountDto>>>, ApiError> {
    let accounts = state.forum_service().moderators(&forum).await?;
    Ok(Json(ApiResponse::success(
        accounts.iter().map(AccountDto::public).collect(),
    )))
}

/// PUT /forums/{forum}/moderators/{permalink}
pub async fn grant_moderator(
    State(state): State<Arc<AppState>>,
    Path((forum, permalink)): Path<(String, String)>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .forum_service()
        .grant_moderator(&forum, &permalink)
        .await?;
    Ok(Json(ApiResponse::success(AccountDto::public(&account))))
}

/// DELETE /forums/{forum}/moderators/{permalink}
pub async fn revoke_moderator(
    State(state): State<Arc<AppState>>,
    Path((forum, permalink)): Path<(String, String)>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .forum_service()
        .revoke_moderator(&forum, &permalink)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "'{permalink}' no longer moderates '{forum}'."
    )))))
}

/// GET /forums/{forum}/moderation
/// Whether the current account may moderate the forum
pub async fn moderation(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(forum): Path<String>,
) -> Result<Json<ApiResponse<ModerationCheck>>, ApiError> {
    let account = ctx.require()?;
    let forum = state.forum_service().get(&forum).await?;

    let moderator = state
        .account_service()
        .is_moderator_of(account, ForumId(forum.id))
        .await?;

    Ok(Json(ApiResponse::success(ModerationCheck {
        forum: forum.permalink,
        account: account.permalink.clone(),
        moderator,
    })))
}
