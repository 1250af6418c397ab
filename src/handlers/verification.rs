use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, no_content, Created, StatusListQuery};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::seller_verification::{self, VerificationStatus},
    errors::ServiceError,
    services::{
        verification::{
            ApproveVerificationRequest, RejectVerificationRequest, SubmitVerificationRequest,
            VerificationStatusView,
        },
        Page,
    },
    ApiResponse, ApiResult, AppState,
};

pub fn verification_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit_verification))
        .route("/me", get(get_my_verification))
        .route("/status", get(get_verification_status))
        .route("/", get(list_verifications))
        .route("/:id", get(get_verification).delete(delete_verification))
        .route("/:id/review", put(start_review))
        .route("/:id/approve", put(approve_verification))
        .route("/:id/reject", put(reject_verification))
        .with_auth(auth)
}

pub async fn submit_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<SubmitVerificationRequest>,
) -> Created<seller_verification::Model> {
    let verification = state.services.verification.submit(&ctx, payload).await?;
    Ok(created(verification))
}

pub async fn get_my_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
) -> ApiResult<seller_verification::Model> {
    let verification = state
        .services
        .verification
        .get_my_verification(&ctx)
        .await?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn get_verification_status(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
) -> ApiResult<VerificationStatusView> {
    let status = state.services.verification.get_status(&ctx).await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn list_verifications(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Page<seller_verification::Model>> {
    let status = match query.status.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<VerificationStatus>().map_err(|_| {
            ServiceError::ValidationError(format!("Unknown verification status: {raw}"))
        })?),
        _ => None,
    };
    let (page, limit) = query.pagination().resolve(&state.config);
    let (items, total) = state
        .services
        .verification
        .list(&ctx, status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(items, total, page, limit))))
}

pub async fn get_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<seller_verification::Model> {
    let verification = state.services.verification.get(&ctx, id).await?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn start_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<seller_verification::Model> {
    let verification = state.services.verification.start_review(&ctx, id).await?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn approve_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ApproveVerificationRequest>>,
) -> ApiResult<seller_verification::Model> {
    // an empty body approves at the default level
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let verification = state
        .services
        .verification
        .approve(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn reject_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectVerificationRequest>,
) -> ApiResult<seller_verification::Model> {
    let verification = state
        .services
        .verification
        .reject(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(verification)))
}

pub async fn delete_verification(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.verification.delete(&ctx, id).await?;
    Ok(no_content())
}
