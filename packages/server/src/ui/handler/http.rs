//! HTTP API endpoint handlers.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tandem_shared::protocol::UserRole;

use crate::{
    domain::{AuthContext, RoomId, SessionMetadata},
    infrastructure::dto::http::{
        ChangePasswordRequest, ErrorResponse, HealthDto, LoginRequest, LoginResponse,
        PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse, RegisterRequest,
        RevokeAllResponse, RoomDetailDto, RoomMemberDto, RoomSummaryDto, SessionDto,
        SuccessResponse, UserDto,
    },
    ui::state::AppState,
    usecase::{IdentityError, NewUser},
};

/// Identity error rendered as a status code and an [`ErrorResponse`] body
#[derive(Debug)]
pub struct ApiError(IdentityError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            IdentityError::DuplicateIdentity => StatusCode::CONFLICT,
            IdentityError::InvalidCredentials | IdentityError::SessionInvalidOrExpired => {
                StatusCode::UNAUTHORIZED
            }
            IdentityError::AccountLocked { .. } => StatusCode::LOCKED,
            IdentityError::ResetTokenInvalid | IdentityError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            IdentityError::EmailNotVerified => StatusCode::FORBIDDEN,
            IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Identity service error: {}", self.0);
        }
        let body = ErrorResponse {
            // Internal details stay in the log
            error: match &self.0 {
                IdentityError::Internal(_) => "internal error".to_string(),
                other => other.to_string(),
            },
            retry_after_ms: match self.0 {
                IdentityError::AccountLocked { retry_after_ms } => Some(retry_after_ms),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Resolve `Authorization: Bearer <token>` to a live session
async fn bearer_context(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(IdentityError::SessionInvalidOrExpired)?;
    state
        .identity
        .validate_token(token.trim())
        .await
        .ok_or_else(|| IdentityError::SessionInvalidOrExpired.into())
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        connections: state.query_rooms_usecase.connection_count().await,
    })
}

/// Get list of rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let rooms = state.query_rooms_usecase.list_rooms().await;

    // Domain Model から DTO への変換
    let summaries = rooms
        .into_iter()
        .map(|(id, member_count)| RoomSummaryDto {
            id: id.to_string(),
            member_count,
        })
        .collect();
    Json(summaries)
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let room_id = RoomId::new(room_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let detail = state
        .query_rooms_usecase
        .room_detail(&room_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(RoomDetailDto {
        id: detail.room_id.to_string(),
        members: detail.members.iter().map(RoomMemberDto::from).collect(),
        document_version: detail.document_version,
    }))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let user = state
        .identity
        .register(NewUser {
            email: request.email,
            password: request.password,
            display_name: request.display_name,
            role: request.role.unwrap_or(UserRole::User),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let metadata = SessionMetadata {
        ip: Some(addr.ip().to_string()),
        device: request.device,
    };
    let outcome = state
        .identity
        .login(&request.email, &request.password, metadata)
        .await?;
    Ok(Json(LoginResponse {
        user: UserDto::from(&outcome.user),
        session: SessionDto::from(&outcome.session),
        token: outcome.token,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, ApiError> {
    let context = bearer_context(&state, &headers).await?;
    let success = state.identity.logout(&context.session.id).await?;
    Ok(Json(SuccessResponse { success }))
}

/// Active sessions of the bearer's user
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionDto>>, ApiError> {
    let context = bearer_context(&state, &headers).await?;
    let sessions = state.identity.list_sessions(&context.user.id).await?;
    Ok(Json(sessions.iter().map(SessionDto::from).collect()))
}

/// Revoke every session of the bearer's user except the calling one
pub async fn revoke_all_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RevokeAllResponse>, ApiError> {
    let context = bearer_context(&state, &headers).await?;
    let revoked = state
        .identity
        .revoke_all_sessions(&context.user.id, Some(&context.session.id))
        .await?;
    Ok(Json(RevokeAllResponse { revoked }))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let context = bearer_context(&state, &headers).await?;
    state
        .identity
        .change_password(
            &context.session.id,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Json<PasswordResetResponse> {
    let grant = state.identity.request_password_reset(&request.email).await;
    Json(PasswordResetResponse {
        success: grant.success,
        reset_token: grant.reset_token,
    })
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .identity
        .reset_password(&request.reset_token, &request.new_password)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
