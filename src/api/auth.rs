use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;
use tracing::warn;

use super::{AccountDto, ApiError, ApiResponse, AppState, MessageResponse};
use crate::constants::session::ACCOUNT_KEY;
use crate::domain::{Account, AccountId, Authenticatable, Roleable};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Login name or email address.
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub account: AccountDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
}

/// Who is making the request, resolved once per request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub account: Option<Account>,
}

impl RequestContext {
    pub fn require(&self) -> Result<&Account, ApiError> {
        self.account.as_ref().ok_or_else(ApiError::unauthorized)
    }

    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        self.account.as_ref().map(|account| account.id)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the current account and stores a [`RequestContext`] in the
/// request extensions. Checks, in order:
/// 1. Session cookie (from login)
/// 2. `Authorization: Bearer <remember_token>` header
///
/// Never rejects; the guards below do that.
pub async fn context_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let account = resolve_account(&state, &session, &headers).await;

    if let Some(account) = &account {
        tracing::Span::current().record("user_id", account.id.value());
    }

    request.extensions_mut().insert(RequestContext { account });
    next.run(request).await
}

async fn resolve_account(state: &AppState, session: &Session, headers: &HeaderMap) -> Option<Account> {
    match session.get::<i32>(ACCOUNT_KEY).await {
        Ok(Some(id)) => match state.account_service().get(AccountId::new(id)).await {
            Ok(Some(account)) if account.can_authenticate() => return Some(account),
            Ok(_) => {
                // Purged, suspended or deleted since login.
                if let Err(e) = session.flush().await {
                    warn!(error = %e, "Failed to drop stale session");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to load session account");
                return None;
            }
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Session read failed"),
    }

    let token = extract_bearer_token(headers)?;
    match state.account_service().resume(&token).await {
        Ok(account) => account,
        Err(e) => {
            warn!(error = %e, "Remember token lookup failed");
            None
        }
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

pub async fn require_login(
    Extension(ctx): Extension<RequestContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    ctx.require()?;
    Ok(next.run(request).await)
}

pub async fn require_admin(
    Extension(ctx): Extension<RequestContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !ctx.require()?.is_admin() {
        return Err(ApiError::forbidden("Only admins can do that"));
    }
    Ok(next.run(request).await)
}

/// Lets the account itself or an admin through.
pub fn ensure_owner_or_admin(viewer: &Account, target: &Account) -> Result<(), ApiError> {
    if viewer.id == target.id || viewer.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("That isn't your user!"))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session
/// Authenticate with login (or email) and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let outcome = state
        .account_service()
        .authenticate(&payload.login, &payload.password, payload.remember_me)
        .await?;

    // Fresh session id on every login.
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(ACCOUNT_KEY, outcome.account.id.value())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    tracing::Span::current().record("user_id", outcome.account.id.value());

    Ok(Json(ApiResponse::success(LoginResponse {
        account: AccountDto::private(&outcome.account),
        remember_token: outcome.remember_token,
    })))
}

/// DELETE /session
/// Ends the session and forgets the remember token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if let Some(id) = ctx.account_id() {
        state.account_service().logout(id).await?;
    }

    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to end session: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "You have been logged out.",
    ))))
}
